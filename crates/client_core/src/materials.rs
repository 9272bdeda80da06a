use std::path::Path;

use crate::workflow::Notification;

pub const MAX_FILES: usize = 10;
pub const MAX_FILE_BYTES: usize = 5 * 1024 * 1024;
const DISPLAY_NAME_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialFile {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl MaterialFile {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Names the part after the final path component.
    pub fn from_path(path: &Path, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "material".to_string());
        Self::new(filename, mime_type, bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    TooLarge,
    TooManyFiles,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRejection {
    pub filename: String,
    pub reason: RejectionReason,
}

impl FileRejection {
    pub fn message(&self) -> &'static str {
        match self.reason {
            RejectionReason::TooLarge => "File too large",
            RejectionReason::TooManyFiles => "Maximum 10 files",
            RejectionReason::Empty => "File is empty",
        }
    }

    pub fn notification(&self) -> Notification {
        Notification::error(self.message()).with_description(format!(
            "\"{}\" was rejected.",
            display_name(&self.filename)
        ))
    }
}

/// Long names are cut to 20 characters followed by "...".
pub fn display_name(filename: &str) -> String {
    if filename.chars().count() > DISPLAY_NAME_CHARS {
        let head: String = filename.chars().take(DISPLAY_NAME_CHARS).collect();
        format!("{head}...")
    } else {
        filename.to_string()
    }
}

/// Splits a selection into accepted files and rejections, keeping selection order.
pub fn validate_materials(files: Vec<MaterialFile>) -> (Vec<MaterialFile>, Vec<FileRejection>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for file in files {
        let reason = if file.bytes.is_empty() {
            Some(RejectionReason::Empty)
        } else if file.bytes.len() > MAX_FILE_BYTES {
            Some(RejectionReason::TooLarge)
        } else if accepted.len() >= MAX_FILES {
            Some(RejectionReason::TooManyFiles)
        } else {
            None
        };
        match reason {
            Some(reason) => rejected.push(FileRejection {
                filename: file.filename,
                reason,
            }),
            None => accepted.push(file),
        }
    }
    (accepted, rejected)
}
