use serde::{Deserialize, Serialize};

/// Used only to personalize captions; never gates generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Boy,
    Girl,
    #[default]
    Unspecified,
}

impl Gender {
    pub fn pronoun(self) -> &'static str {
        match self {
            Gender::Boy => "he",
            Gender::Girl => "she",
            Gender::Unspecified => "they",
        }
    }
}

/// Reference to an auxiliary image attached to generation requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub path: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Immutable per-run context, passed by reference to the compiler and
/// pipeline instead of being read from ambient state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(default)]
    pub pet_name: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub product_images: Vec<ImageRef>,
    #[serde(default)]
    pub logo_images: Vec<ImageRef>,
}

impl SessionContext {
    pub fn trimmed_name(&self) -> &str {
        self.pet_name.trim()
    }

    /// Trimmed pet name, or the literal "the dog" when none was entered.
    pub fn display_name(&self) -> &str {
        let name = self.trimmed_name();
        if name.is_empty() {
            "the dog"
        } else {
            name
        }
    }

    pub fn has_name(&self) -> bool {
        !self.trimmed_name().is_empty()
    }

    pub fn has_logo(&self) -> bool {
        !self.logo_images.is_empty()
    }

    pub fn has_products(&self) -> bool {
        !self.product_images.is_empty()
    }

    /// Every auxiliary image, logos first, attached to each generation call.
    pub fn all_image_refs(&self) -> Vec<ImageRef> {
        let mut refs = self.logo_images.clone();
        refs.extend(self.product_images.iter().cloned());
        refs
    }
}
