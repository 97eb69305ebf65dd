//! Small HTML templating language used by the bundled pages.
//!
//! ```text
//! [[ student.name ]]                      escaped variable
//! <!--[if admin]--> .. <!--[else]--> .. <!--[end]-->
//! <!--[ifnot entry.flagged]--> .. <!--[end]-->
//! <!--[if action == "Edit"]--> .. <!--[end]-->
//! <!--[repeat entries as e]--> [[ e.name ]] <!--[end]-->
//! ```
//!
//! Pages are parsed once at startup into a node tree and rendered against a
//! `serde_json::Value` context.

mod parser;
mod render;

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

pub use parser::{parse, Cond, Node, Path};
pub use render::{escape_html, render};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("{message} at byte {offset}")]
    Syntax { offset: usize, message: String },
    #[error("template {page}: {source}")]
    InPage { page: &'static str, source: Box<TemplateError> },
    #[error("template context: {0}")]
    Context(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Signin,
    List,
    Edit,
    Admin,
    Flagged,
}

impl Page {
    pub const ALL: [Page; 5] = [Page::Signin, Page::List, Page::Edit, Page::Admin, Page::Flagged];

    pub fn name(self) -> &'static str {
        match self {
            Page::Signin => "signin",
            Page::List => "list",
            Page::Edit => "edit",
            Page::Admin => "admin",
            Page::Flagged => "flagged",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Page::Signin => include_str!("../templates/signin.html"),
            Page::List => include_str!("../templates/list.html"),
            Page::Edit => include_str!("../templates/edit.html"),
            Page::Admin => include_str!("../templates/admin.html"),
            Page::Flagged => include_str!("../templates/flagged.html"),
        }
    }
}

/// Parsed pages, ready to render.
#[derive(Debug, Clone)]
pub struct Templates {
    pages: HashMap<Page, Vec<Node>>,
}

impl Templates {
    /// Parse the pages compiled into the binary.
    pub fn bundled() -> Result<Self, TemplateError> {
        let mut pages = HashMap::new();
        for page in Page::ALL {
            let nodes = parse(page.source())
                .map_err(|e| TemplateError::InPage { page: page.name(), source: Box::new(e) })?;
            pages.insert(page, nodes);
        }
        Ok(Self { pages })
    }

    pub fn render<T: Serialize>(&self, page: Page, ctx: &T) -> Result<String, TemplateError> {
        let ctx = serde_json::to_value(ctx).map_err(|e| TemplateError::Context(e.to_string()))?;
        let nodes = self.pages.get(&page).map(Vec::as_slice).unwrap_or(&[]);
        Ok(render(nodes, &ctx))
    }
}
