use unicode_segmentation::UnicodeSegmentation;

/// A first or last name supplied on the subscription form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberName(String);

impl SubscriberName {
    const MAX_GRAPHEMES: usize = 50;
    const FORBIDDEN_CHARACTERS: [char; 9] = ['/', '(', ')', '"', '<', '>', '\\', '{', '}'];

    pub fn parse(name: String) -> Result<Self, String> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err("Subscriber name cannot be empty".into());
        }

        if name.graphemes(true).count() > Self::MAX_GRAPHEMES {
            return Err(format!(
                "Subscriber name cannot be longer than {} characters",
                Self::MAX_GRAPHEMES
            ));
        }

        if name.chars().any(|c| Self::FORBIDDEN_CHARACTERS.contains(&c)) {
            return Err("Subscriber name contains forbidden characters".into());
        }

        Ok(Self(name))
    }

    /// Absent or blank names are simply not recorded.
    pub fn parse_optional(name: Option<String>) -> Result<Option<Self>, String> {
        match name {
            Some(name) if !name.trim().is_empty() => Self::parse(name).map(Some),
            _ => Ok(None),
        }
    }
}

impl AsRef<str> for SubscriberName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<SubscriberName> for String {
    fn from(name: SubscriberName) -> Self {
        name.0
    }
}

impl std::fmt::Display for SubscriberName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
