/// Structured diagnostic messages
///
/// A message is a sequence of literal text and references (names of tasks,
/// methods, listeners...). Keeping references typed lets every output format
/// render them consistently: backticks in text output, tagged fragments in
/// the JSON report.
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Fragment {
    Text(String),
    Reference(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct StructuredMessage {
    fragments: Vec<Fragment>,
}

impl StructuredMessage {
    /// Build a message with a builder closure
    ///
    /// ```
    /// use planstore::problems::StructuredMessage;
    ///
    /// let message = StructuredMessage::build(|b| {
    ///     b.text("invocation of ").reference("Task.project").text(" is unsupported.");
    /// });
    /// assert_eq!(message.render(), "invocation of `Task.project` is unsupported.");
    /// ```
    pub fn build(f: impl FnOnce(&mut MessageBuilder)) -> Self {
        let mut builder = MessageBuilder::default();
        f(&mut builder);
        builder.finish()
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::build(|b| {
            b.text(text);
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Text(text) => out.push_str(text),
                Fragment::Reference(name) => {
                    out.push('`');
                    out.push_str(name);
                    out.push('`');
                }
            }
        }
        out
    }
}

impl fmt::Display for StructuredMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug, Default)]
pub struct MessageBuilder {
    fragments: Vec<Fragment>,
}

impl MessageBuilder {
    pub fn text(&mut self, text: impl Into<String>) -> &mut Self {
        self.push(Fragment::Text(text.into()))
    }

    pub fn reference(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(Fragment::Reference(name.into()))
    }

    fn push(&mut self, fragment: Fragment) -> &mut Self {
        // Adjacent text fragments are merged so equal messages compare equal
        // regardless of how they were assembled.
        if let Fragment::Text(text) = &fragment {
            if text.is_empty() {
                return self;
            }
            if let Some(Fragment::Text(last)) = self.fragments.last_mut() {
                last.push_str(text);
                return self;
            }
        }
        self.fragments.push(fragment);
        self
    }

    fn finish(self) -> StructuredMessage {
        StructuredMessage {
            fragments: self.fragments,
        }
    }
}
