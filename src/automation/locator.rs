use std::fmt;

/// How to find an element on a page. Locators are plain data so that site
/// adapters can be declared as constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locator {
    /// A CSS selector.
    Css(&'static str),
    /// An element with the given tag whose rendered text contains `text`.
    Text { tag: &'static str, text: &'static str },
}

impl Locator {
    pub const fn css(selector: &'static str) -> Self {
        Locator::Css(selector)
    }

    pub const fn button(text: &'static str) -> Self {
        Locator::Text { tag: "button", text }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => f.write_str(selector),
            Locator::Text { tag, text } => write!(f, "{tag}:has-text(\"{text}\")"),
        }
    }
}

/// A resolved, visible element inside one browser session.
///
/// Handles are only meaningful to the session that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Semantic applicant fields the engine knows how to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileField {
    FirstName,
    LastName,
    Email,
    Phone,
}

impl ProfileField {
    pub fn label(&self) -> &'static str {
        match self {
            ProfileField::FirstName => "first name",
            ProfileField::LastName => "last name",
            ProfileField::Email => "email",
            ProfileField::Phone => "phone",
        }
    }
}

/// Ordered candidate locators for one semantic field. The first visible
/// candidate wins.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: ProfileField,
    pub candidates: &'static [Locator],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_playwright_notation() {
        assert_eq!(Locator::css("input[type=\"email\"]").to_string(), "input[type=\"email\"]");
        assert_eq!(
            Locator::button("Easy Apply").to_string(),
            "button:has-text(\"Easy Apply\")"
        );
    }
}
