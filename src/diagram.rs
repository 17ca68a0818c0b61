use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;

pub const START_DELIMITER: &str = "@startuml";
pub const END_DELIMITER: &str = "@enduml";

/// Class names ending with this suffix are grouped under "Systems".
pub const SYSTEM_SUFFIX: &str = "System";

static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)@startuml(.*?)@enduml").expect("valid body pattern"));
// `\s+` spans newlines, so a relation ending in a name literally `class`
// (`X --> class`) also declares the first word of the next line.
static CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bclass\s+(\w+)").expect("valid class pattern"));
static RELATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\s+-->\s+(\w+)").expect("valid relation pattern"));

/// A directed dependency: `source --> target`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Relation {
    pub source: String,
    pub target: String,
}

impl Relation {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// The known classes and relations of one architecture diagram.
///
/// Both collections are sets; relations may name classes that were never
/// declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagramState {
    pub classes: BTreeSet<String>,
    pub relations: BTreeSet<Relation>,
}

/// Return the text between the first `@startuml` and the following `@enduml`.
pub fn extract_body(text: &str) -> Option<&str> {
    BODY_RE
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
}

/// True when both delimiters appear somewhere in `text`.
pub fn has_delimiters(text: &str) -> bool {
    text.contains(START_DELIMITER) && text.contains(END_DELIMITER)
}

/// Lexical classification: a name is a System iff it ends with `System`.
pub fn is_system(name: &str) -> bool {
    name.ends_with(SYSTEM_SUFFIX)
}

impl DiagramState {
    /// Scan a diagram body for `class <word>` declarations and
    /// `<word> --> <word>` relations. Anything else is ignored.
    pub fn extract(body: &str) -> Self {
        let classes = CLASS_RE
            .captures_iter(body)
            .map(|cap| cap[1].to_string())
            .collect();
        let relations = RELATION_RE
            .captures_iter(body)
            .map(|cap| Relation::new(&cap[1], &cap[2]))
            .collect();
        Self { classes, relations }
    }

    /// Set union of classes and of relations.
    pub fn merge(&self, other: &DiagramState) -> DiagramState {
        DiagramState {
            classes: self.classes.union(&other.classes).cloned().collect(),
            relations: self.relations.union(&other.relations).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.relations.is_empty()
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.classes
            .iter()
            .map(String::as_str)
            .filter(|name| !is_system(name))
    }

    pub fn systems(&self) -> impl Iterator<Item = &str> {
        self.classes
            .iter()
            .map(String::as_str)
            .filter(|name| is_system(name))
    }

    /// Serialize into a full PlantUML document, delimiters included.
    ///
    /// Classes are grouped into `package "Components"` and
    /// `package "Systems"` blocks, followed by one `A --> B` line per
    /// relation. Ordering comes from the sets, so the output does not
    /// depend on the order things were merged in.
    pub fn render(&self) -> String {
        let components = render_package("Components", self.components());
        let systems = render_package("Systems", self.systems());
        let relations = self
            .relations
            .iter()
            .map(|r| format!("{} --> {}", r.source, r.target))
            .collect::<Vec<_>>()
            .join("\n");

        format!("{START_DELIMITER}\n{components}\n\n{systems}\n\n{relations}\n{END_DELIMITER}\n")
    }
}

fn render_package<'a>(name: &str, classes: impl Iterator<Item = &'a str>) -> String {
    let mut out = format!("package \"{name}\" {{\n");
    for class in classes {
        let _ = writeln!(out, "  class {class}");
    }
    out.push('}');
    out
}
