use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

pub const SERVICE_NAME: &str = "digitized_image_packaging";

pub const ATTR_REFID: &str = "refid";
pub const ATTR_SERVICE: &str = "service";
pub const ATTR_OUTCOME: &str = "outcome";
pub const ATTR_MESSAGE: &str = "message";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job outcome message with string attributes for subscription filtering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message: String,
    pub attributes: BTreeMap<String, String>,
}

impl Notification {
    pub fn success(refid: &str) -> Self {
        Self::new(
            refid,
            Outcome::Success,
            format!("Package {} successfully packaged.", refid),
        )
    }

    /// Failure notice; the `message` attribute carries the error and its
    /// source chain.
    pub fn failure(refid: &str, error: &(dyn Error + 'static)) -> Self {
        let mut notification = Self::new(
            refid,
            Outcome::Failure,
            format!("Package {} failed packaging.", refid),
        );
        notification.attributes.insert(
            ATTR_MESSAGE.to_string(),
            format!("{}\n\n<pre>{}</pre>", error, error_chain(error)),
        );
        notification
    }

    fn new(refid: &str, outcome: Outcome, message: String) -> Self {
        let attributes = [
            (ATTR_REFID, refid),
            (ATTR_SERVICE, SERVICE_NAME),
            (ATTR_OUTCOME, outcome.as_str()),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

        Self {
            message,
            attributes,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn outcome(&self) -> Option<&str> {
        self.attribute(ATTR_OUTCOME)
    }
}

/// Renders an error followed by each of its sources, one per line.
pub fn error_chain(error: &(dyn Error + 'static)) -> String {
    let mut lines = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        lines.push(format!("Caused by: {}", cause));
        source = cause.source();
    }
    lines.join("\n")
}
