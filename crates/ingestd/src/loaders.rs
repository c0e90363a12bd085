use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no loader registered for extension {0:?}")]
    NoLoader(String),
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
    #[error("document produced no text")]
    Empty,
}

/// A Loader turns one downloaded file into a sequence of text units for the
/// chunker. Loaders run on blocking worker threads.
pub trait Loader: Send + Sync + 'static {
    fn load(&self, path: &Path) -> Result<Vec<String>, Error>;
}

/// Extension-keyed registry of document loaders. Text-native formats ship
/// built in; binary formats are pluggable through `register`.
pub struct LoaderRegistry {
    loaders: BTreeMap<String, Box<dyn Loader>>,
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        let mut registry = Self {
            loaders: BTreeMap::new(),
        };
        registry.register(".txt", PlainTextLoader);
        registry.register(".md", PlainTextLoader);
        registry.register(".csv", PlainTextLoader);
        registry.register(".json", PlainTextLoader);
        registry.register(".html", MarkupLoader);
        registry.register(".htm", MarkupLoader);
        registry.register(".xml", MarkupLoader);
        registry
    }
}

impl LoaderRegistry {
    pub fn register<L: Loader>(&mut self, extension: &str, loader: L) {
        self.loaders
            .insert(extension.to_ascii_lowercase(), Box::new(loader));
    }

    /// Load `path` with the loader registered for its extension.
    pub fn load(&self, path: &Path) -> Result<Vec<String>, Error> {
        let extension = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(models::extension_of)
            .unwrap_or_default();

        let loader = self
            .loaders
            .get(&extension)
            .ok_or_else(|| Error::NoLoader(extension.clone()))?;

        let units = loader.load(path)?;
        if units.iter().all(|unit| unit.trim().is_empty()) {
            return Err(Error::Empty);
        }
        Ok(units)
    }
}

/// Whole file as a single text unit.
struct PlainTextLoader;

impl Loader for PlainTextLoader {
    fn load(&self, path: &Path) -> Result<Vec<String>, Error> {
        let text = std::fs::read_to_string(path)?;
        Ok(vec![text])
    }
}

/// Markup stripped to its text content: tags are removed, and script and
/// style bodies are dropped entirely.
struct MarkupLoader;

impl Loader for MarkupLoader {
    fn load(&self, path: &Path) -> Result<Vec<String>, Error> {
        let raw = std::fs::read_to_string(path)?;
        Ok(vec![strip_markup(&raw)])
    }
}

fn strip_markup(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(open) = rest.find('<') {
        text.push_str(&rest[..open]);
        rest = &rest[open..];

        let Some(close) = rest.find('>') else { break };
        let tag = rest[1..close].trim().to_ascii_lowercase();
        rest = &rest[close + 1..];

        // Drop the body of non-content elements.
        for skipped in ["script", "style"] {
            if tag == skipped || tag.starts_with(&format!("{skipped} ")) {
                if let Some(end) = rest.to_ascii_lowercase().find(&format!("</{skipped}")) {
                    rest = &rest[end..];
                }
            }
        }
        if !text.ends_with(char::is_whitespace) && !text.is_empty() {
            text.push(' ');
        }
    }
    text.push_str(rest);

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn write_temp(extension: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(extension)
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn plain_text_is_one_unit() {
        let file = write_temp(".txt", "First sentence. Second sentence.");
        let units = LoaderRegistry::default().load(file.path()).unwrap();
        assert_eq!(units, vec!["First sentence. Second sentence.".to_string()]);
    }

    #[test]
    fn markup_is_stripped_to_text() {
        let file = write_temp(
            ".html",
            "<html><head><style>p { color: red; }</style></head>\
             <body><p>Hello there.</p><p>Second paragraph.</p></body></html>",
        );
        let units = LoaderRegistry::default().load(file.path()).unwrap();
        assert_eq!(units, vec!["Hello there. Second paragraph.".to_string()]);
    }

    #[test]
    fn unregistered_extension_is_rejected() {
        let file = write_temp(".pdf", "%PDF-1.4");
        match LoaderRegistry::default().load(file.path()) {
            Err(Error::NoLoader(ext)) => assert_eq!(ext, ".pdf"),
            other => panic!("expected NoLoader, got {other:?}"),
        }
    }

    #[test]
    fn empty_documents_are_rejected() {
        let file = write_temp(".txt", "   \n ");
        assert!(matches!(
            LoaderRegistry::default().load(file.path()),
            Err(Error::Empty)
        ));
    }

    #[test]
    fn custom_loaders_can_be_registered() {
        struct StubLoader;
        impl Loader for StubLoader {
            fn load(&self, _path: &Path) -> Result<Vec<String>, Error> {
                Ok(vec!["stubbed text".to_string()])
            }
        }

        let mut registry = LoaderRegistry::default();
        registry.register(".pdf", StubLoader);

        let file = write_temp(".pdf", "%PDF-1.4");
        assert_eq!(
            registry.load(file.path()).unwrap(),
            vec!["stubbed text".to_string()],
        );
    }
}
