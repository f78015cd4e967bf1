// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test templates served as Webmention sources.
//!
//! A template is a Tera document rendered per fetch with these variables:
//!
//! - `name`: the template id
//! - `target`: the mentioned URL
//! - `alternate_target`: the second target, or `target` when there is none
//! - `comment_url`: callback URL of `basic-reply` replying to this document

use crate::error::TemplateError;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use tera::{Context, Tera};
use tracing::debug;

const TEMPLATE_EXTENSION: &str = "html";

// Shipped templates, compiled in so the binary works from any directory.
const EMBEDDED_TEMPLATES: &[(&str, &str)] = &[
    ("basic-like", include_str!("../templates/basic-like.html")),
    ("basic-mention", include_str!("../templates/basic-mention.html")),
    ("basic-reply", include_str!("../templates/basic-reply.html")),
    ("basic-repost", include_str!("../templates/basic-repost.html")),
    ("multiple-targets", include_str!("../templates/multiple-targets.html")),
];

/// Per-fetch inputs besides the template id and target.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub alternate_target: Option<String>,
    pub comment_url: String,
}

/// Source of the templates a run pings for and serves.
pub trait TemplateSource: Send + Sync + 'static {
    /// All template ids, in ping order.
    fn list_template_ids(&self)
        -> impl Future<Output = Result<Vec<String>, TemplateError>> + Send;

    /// Render template `id` mentioning `target`.
    fn render(
        &self,
        id: &str,
        target: &str,
        options: &RenderOptions,
    ) -> impl Future<Output = Result<String, TemplateError>> + Send;
}

/// Templates read from `*.html` files in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryTemplates {
    dir: PathBuf,
}

impl DirectoryTemplates {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TemplateSource for DirectoryTemplates {
    async fn list_template_ids(&self) -> Result<Vec<String>, TemplateError> {
        let unavailable = |source| TemplateError::ListUnavailable {
            path: self.dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(unavailable)?;
        let mut ids = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) if is_valid_id(stem) => ids.push(stem.to_string()),
                _ => debug!(path = %path.display(), "Skipping file with unusable name"),
            }
        }

        ids.sort();
        Ok(ids)
    }

    async fn render(
        &self,
        id: &str,
        target: &str,
        options: &RenderOptions,
    ) -> Result<String, TemplateError> {
        if !is_valid_id(id) {
            return Err(TemplateError::UnknownTemplate(id.to_string()));
        }

        let path = self.dir.join(format!("{id}.{TEMPLATE_EXTENSION}"));
        let source = match tokio::fs::read_to_string(&path).await {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TemplateError::UnknownTemplate(id.to_string()));
            }
            Err(source) => {
                return Err(TemplateError::Read {
                    name: id.to_string(),
                    source,
                });
            }
        };

        render_source(id, &source, target, options)
    }
}

/// Templates held in memory, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct MemoryTemplates {
    templates: BTreeMap<String, String>,
}

impl MemoryTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// The templates shipped with the crate.
    pub fn embedded() -> Self {
        EMBEDDED_TEMPLATES
            .iter()
            .fold(Self::new(), |templates, (id, source)| templates.with_template(*id, *source))
    }

    /// Add or replace template `id`.
    pub fn with_template(mut self, id: impl Into<String>, source: impl Into<String>) -> Self {
        self.templates.insert(id.into(), source.into());
        self
    }
}

impl TemplateSource for MemoryTemplates {
    async fn list_template_ids(&self) -> Result<Vec<String>, TemplateError> {
        Ok(self.templates.keys().cloned().collect())
    }

    async fn render(
        &self,
        id: &str,
        target: &str,
        options: &RenderOptions,
    ) -> Result<String, TemplateError> {
        let source = self
            .templates
            .get(id)
            .ok_or_else(|| TemplateError::UnknownTemplate(id.to_string()))?;
        render_source(id, source, target, options)
    }
}

fn render_source(
    id: &str,
    source: &str,
    target: &str,
    options: &RenderOptions,
) -> Result<String, TemplateError> {
    let mut context = Context::new();
    context.insert("name", id);
    context.insert("target", target);
    context.insert(
        "alternate_target",
        options.alternate_target.as_deref().unwrap_or(target),
    );
    context.insert("comment_url", &options.comment_url);

    Tera::one_off(source, &context, true).map_err(|source| TemplateError::Render {
        name: id.to_string(),
        source,
    })
}

/// Template ids double as file names, so keep them to a safe alphabet.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
