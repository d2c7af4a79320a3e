use serde::{Deserialize, Serialize};

/// One change applied to the reference identity for a generated image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    /// Short stable id, also embedded in output file names
    pub id: String,
    /// Human phrase substituted into templated prompts
    pub mutation: String,
    /// Full prompt for variant mutations; `None` for templated (anchor) ones
    pub prompt: Option<String>,
}

impl Mutation {
    pub fn templated(id: impl Into<String>, mutation: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mutation: mutation.into(),
            prompt: None,
        }
    }

    pub fn literal(
        id: impl Into<String>,
        mutation: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            mutation: mutation.into(),
            prompt: Some(prompt.into()),
        }
    }
}
