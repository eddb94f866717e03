//! Tool descriptions as the model reads them.
//!
//! The repository tools overlap (`search_code` with kind `path` against
//! `list_files` and `project_tree`, `search_code` against `find_symbol`,
//! `git_log` against `git_show`), and a model that picks the wrong one wastes
//! a round trip. A [`ToolDoc`] therefore carries, besides a one-line summary
//! and the argument schema, the situations that call for the tool, a
//! redirect to the sibling tool for each overlapping case, sample calls, and
//! the layout of the evidence the call will produce.
//! [`ToolDoc::describe`] flattens all of that into the description string.

use schemars::JsonSchema;
use serde_json::Value;

use crate::ToolDef;

/// Description and argument schema of one repository tool.
#[derive(Debug, Clone)]
pub struct ToolDoc {
    name: &'static str,
    summary: String,
    use_when: Vec<String>,
    redirects: Vec<Redirect>,
    samples: Vec<Sample>,
    layout: Option<String>,
    schema: Value,
}

/// "For `situation`, call `tool` instead."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub situation: String,
    pub tool: &'static str,
}

/// A sample call and what it yields.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Sample {
    call: String,
    yields: String,
}

impl ToolDoc {
    /// A tool with no arguments until [`args`](Self::args) says otherwise.
    pub fn new(name: &'static str, summary: impl Into<String>) -> Self {
        Self {
            name,
            summary: summary.into(),
            use_when: Vec::new(),
            redirects: Vec::new(),
            samples: Vec::new(),
            layout: None,
            schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Take the argument schema from the struct the arguments deserialize
    /// into, so the two cannot drift apart.
    pub fn args<T: JsonSchema>(mut self) -> Self {
        self.schema = crate::json_schema_for::<T>();
        self
    }

    /// Constrain the integer argument `field` to `min..=max`. A field the
    /// schema does not have is ignored.
    pub fn range(mut self, field: &str, min: u64, max: u64) -> Self {
        if let Some(prop) = self
            .schema
            .get_mut("properties")
            .and_then(|p| p.get_mut(field))
            .and_then(Value::as_object_mut)
        {
            prop.insert("minimum".into(), Value::from(min));
            prop.insert("maximum".into(), Value::from(max));
        }
        self
    }

    /// A situation this tool is the right first choice for.
    pub fn use_when(mut self, situation: impl Into<String>) -> Self {
        self.use_when.push(situation.into());
        self
    }

    /// Send the model to `tool` when `situation` holds.
    pub fn instead(mut self, situation: impl Into<String>, tool: &'static str) -> Self {
        self.redirects.push(Redirect {
            situation: situation.into(),
            tool,
        });
        self
    }

    pub fn sample(mut self, call: impl Into<String>, yields: impl Into<String>) -> Self {
        self.samples.push(Sample {
            call: call.into(),
            yields: yields.into(),
        });
        self
    }

    /// How each item of the result appears in the assembled context.
    pub fn renders(mut self, layout: impl Into<String>) -> Self {
        self.layout = Some(layout.into());
        self
    }

    pub fn redirects(&self) -> &[Redirect] {
        &self.redirects
    }

    /// The description string sent with the tool definition.
    pub fn describe(&self) -> String {
        let mut lines = vec![format!("{}.", self.summary.trim_end_matches('.'))];
        if !self.use_when.is_empty() {
            lines.push(format!("Use it {}.", self.use_when.join("; or ")));
        }
        for r in &self.redirects {
            lines.push(format!("Prefer `{}` {}.", r.tool, r.situation));
        }
        for s in &self.samples {
            lines.push(format!("Example: {} gives {}.", s.call, s.yields));
        }
        if let Some(layout) = &self.layout {
            lines.push(format!("Result: {layout}"));
        }
        lines.join("\n")
    }

    pub fn into_def(self) -> ToolDef {
        let description = self.describe();
        ToolDef::new(self.name, description, self.schema)
    }
}
