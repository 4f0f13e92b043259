//! Content classification by file extension.

/// How a served file is treated by the deploy pipeline and the static server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Server-executed template (configured extension).
    Template,
    /// `.html` or `.htm` page.
    Html,
    /// JavaScript, minified with a companion source map.
    Script,
    /// CSS, minified with a companion source map.
    Stylesheet,
    Other,
}

impl AssetKind {
    pub fn classify(path: &str, template_ext: &str) -> Self {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let Some((_, ext)) = file_name.rsplit_once('.') else {
            return AssetKind::Other;
        };
        if ext == template_ext {
            return AssetKind::Template;
        }
        match ext.to_ascii_lowercase().as_str() {
            "html" | "htm" => AssetKind::Html,
            "js" | "mjs" => AssetKind::Script,
            "css" => AssetKind::Stylesheet,
            _ => AssetKind::Other,
        }
    }

    /// Scripts and stylesheets are written with a `<path>.map` beside them.
    pub fn has_source_map(self) -> bool {
        matches!(self, AssetKind::Script | AssetKind::Stylesheet)
    }
}
