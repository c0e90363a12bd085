/// Extension -> MIME type map used for presigned uploads and for the
/// ingestion allow-list. Extensions are matched lower-case with the dot.
pub const ALLOWED_EXTENSIONS: &[(&str, &str)] = &[
    (".txt", "text/plain"),
    (".html", "text/html"),
    (".htm", "text/html"),
    (".json", "application/json"),
    (".xml", "application/xml"),
    (".csv", "text/csv"),
    (".pdf", "application/pdf"),
    (".doc", "application/msword"),
    (
        ".docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    (".xls", "application/vnd.ms-excel"),
    (
        ".xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    (".ppt", "application/vnd.ms-powerpoint"),
    (
        ".pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    (".md", "text/markdown"),
];

/// Returns the extension of `file_name` (with leading dot, lower-cased),
/// or None when the name has no extension.
pub fn extension_of(file_name: &str) -> Option<String> {
    let dot = file_name.rfind('.')?;
    if dot == 0 || dot + 1 == file_name.len() {
        return None;
    }
    Some(file_name[dot..].to_ascii_lowercase())
}

pub fn is_allowed_extension(extension: &str) -> bool {
    let extension = extension.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.iter().any(|(ext, _)| *ext == extension)
}

/// Content type for a file name, or None when its extension is not allowed.
pub fn content_type_for(file_name: &str) -> Option<&'static str> {
    let extension = extension_of(file_name)?;
    ALLOWED_EXTENSIONS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn extension_extraction() {
        assert_eq!(extension_of("report.PDF").as_deref(), Some(".pdf"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some(".gz"));
        assert_eq!(extension_of("no_extension"), None);
        assert_eq!(extension_of(".hidden"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn allow_list() {
        assert!(is_allowed_extension(".md"));
        assert!(is_allowed_extension(".DOCX"));
        assert!(!is_allowed_extension(".exe"));
        assert!(!is_allowed_extension("md"));
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("a.csv"), Some("text/csv"));
        assert_eq!(content_type_for("slides.pptx").unwrap(), "application/vnd.openxmlformats-officedocument.presentationml.presentation");
        assert_eq!(content_type_for("binary.exe"), None);
    }
}
