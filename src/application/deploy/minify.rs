//! Script and stylesheet minification with companion source maps.
//!
//! Uses oxc for JavaScript and lightningcss for CSS. Scripts are lowered to the configured
//! target before compression. Both maps list the file's base name as their only source so
//! they resolve beside the minified file.

use std::path::{Path, PathBuf};

use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::semantic::SemanticBuilder;
use oxc::span::SourceType;
use oxc::transformer::{TransformOptions, Transformer};
use oxc_compat::EngineTargets;
use parcel_sourcemap::SourceMap;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MinifyError {
    #[error("failed to parse script `{file}`: {message}")]
    Script { file: String, message: String },
    #[error("failed to lower script `{file}` to `{target}`: {message}")]
    Transform {
        file: String,
        target: String,
        message: String,
    },
    #[error("failed to minify stylesheet `{file}`: {message}")]
    Stylesheet { file: String, message: String },
    #[error("failed to produce source map for `{file}`: {message}")]
    SourceMap { file: String, message: String },
}

#[derive(Debug, Clone)]
pub struct Minified {
    pub code: String,
    /// Source map JSON.
    pub map: String,
}

/// Lower a browser script to `target` (for example `es2015`) and minify it.
///
/// `.js` files are classic scripts, so their top-level declarations are globals and survive
/// compression even when nothing in the file references them. `.mjs` files are modules.
pub fn minify_script(
    file_name: &str,
    source: &str,
    target: &str,
) -> Result<Minified, MinifyError> {
    let script_error = |message: String| MinifyError::Script {
        file: file_name.to_string(),
        message,
    };
    let transform_error = |message: String| MinifyError::Transform {
        file: file_name.to_string(),
        target: target.to_string(),
        message,
    };

    let allocator = Allocator::default();
    let source_type = if file_name.ends_with(".mjs") {
        SourceType::mjs()
    } else {
        SourceType::script()
    };

    let parsed = Parser::new(&allocator, source, source_type).parse();
    if !parsed.errors.is_empty() {
        return Err(script_error(join_diagnostics(&parsed.errors)));
    }
    let mut program = parsed.program;

    let semantic = SemanticBuilder::new().build(&program);
    if !semantic.errors.is_empty() {
        return Err(script_error(join_diagnostics(&semantic.errors)));
    }
    let scoping = semantic.semantic.into_scoping();

    let transform_options = TransformOptions::from_target(target).map_err(transform_error)?;
    let engine_targets = EngineTargets::from_target(target).map_err(transform_error)?;
    let transformed = Transformer::new(&allocator, Path::new(file_name), &transform_options)
        .build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        return Err(transform_error(join_diagnostics(&transformed.errors)));
    }

    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions {
            target: engine_targets,
            ..CompressOptions::smallest()
        }),
    };
    let minified = Minifier::new(options).minify(&allocator, &mut program);
    let output = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            source_map_path: Some(PathBuf::from(file_name)),
            ..CodegenOptions::default()
        })
        .with_scoping(minified.scoping)
        .build(&program);

    let map = output.map.ok_or_else(|| MinifyError::SourceMap {
        file: file_name.to_string(),
        message: "code generator returned no map".to_string(),
    })?;

    Ok(Minified {
        code: output.code,
        map: with_single_source(&map.to_json_string(), file_name)?,
    })
}

fn join_diagnostics(errors: &[impl ToString]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Minify a stylesheet.
pub fn minify_stylesheet(file_name: &str, source: &str) -> Result<Minified, MinifyError> {
    let stylesheet_error = |message: String| MinifyError::Stylesheet {
        file: file_name.to_string(),
        message,
    };

    let stylesheet = StyleSheet::parse(
        source,
        ParserOptions {
            filename: file_name.to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|err| stylesheet_error(err.to_string()))?;

    let mut source_map = SourceMap::new("/");
    let result = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            source_map: Some(&mut source_map),
            ..PrinterOptions::default()
        })
        .map_err(|err| stylesheet_error(err.to_string()))?;

    let json = source_map
        .to_json(None)
        .map_err(|err| MinifyError::SourceMap {
            file: file_name.to_string(),
            message: format!("{err:?}"),
        })?;

    Ok(Minified {
        code: result.code,
        map: with_single_source(&json, file_name)?,
    })
}

/// Rewrite a map's `sources` to exactly `[file_name]`.
fn with_single_source(map: &str, file_name: &str) -> Result<String, MinifyError> {
    let map_error = |err: serde_json::Error| MinifyError::SourceMap {
        file: file_name.to_string(),
        message: err.to_string(),
    };
    let mut json: Value = serde_json::from_str(map).map_err(map_error)?;
    if let Value::Object(fields) = &mut json {
        fields.insert(
            "sources".to_string(),
            Value::Array(vec![Value::String(file_name.to_string())]),
        );
    }
    serde_json::to_string(&json).map_err(map_error)
}
