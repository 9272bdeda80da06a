use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! token_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

token_newtype!(JobId);
token_newtype!(MaterialKey);

/// One unit of a built presentation: a rendered image plus its narration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    #[serde(rename = "slideIndex")]
    pub index: u32,
    pub title: String,
    #[serde(rename = "slide_png_url")]
    pub image_url: String,
    pub audio_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutlineTopic {
    pub title: String,
    #[serde(default)]
    pub subtopics: Vec<String>,
}

impl OutlineTopic {
    pub fn new(title: impl Into<String>, subtopics: Vec<String>) -> Self {
        Self {
            title: title.into(),
            subtopics,
        }
    }
}
