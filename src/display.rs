//! Rendering helpers for server display-part fragments.
//!
//! The server decomposes display text into tagged fragments; joining them
//! back into strings is the caller's job. These helpers compose the
//! common shapes: flat fragment runs, and full call signatures with
//! parameter and item documentation.

use crate::types::{DisplayPart, SignatureHelpItem, SignatureHelpItems};

/// Concatenate the text of a fragment run.
#[must_use]
pub fn join_display_parts(parts: &[DisplayPart]) -> String {
    parts.iter().map(|p| p.text.as_str()).collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Render one candidate signature as display text.
///
/// Parameters are joined by the separator fragment between the prefix and
/// suffix; parameter documentation rides along as an inline block
/// comment, item documentation as a trailing comment block.
#[must_use]
pub fn render_signature(item: &SignatureHelpItem) -> String {
    let prefix = join_display_parts(&item.prefix_display_parts);
    let separator = join_display_parts(&item.separator_display_parts);
    let suffix = join_display_parts(&item.suffix_display_parts);

    let parameters: Vec<String> = item
        .parameters
        .iter()
        .map(|parameter| {
            let mut text = join_display_parts(&parameter.display_parts);
            if !parameter.documentation.is_empty() {
                text.push_str(" /* ");
                text.push_str(&join_display_parts(&parameter.documentation));
                text.push_str(" */");
            }
            text
        })
        .collect();

    let mut signature =
        collapse_whitespace(&format!("{prefix}{}{suffix}", parameters.join(&separator)));

    if !item.documentation.is_empty() {
        let documentation = join_display_parts(&item.documentation);
        signature.push_str("\n/**\n * ");
        signature.push_str(&documentation.replace('\n', "\n * "));
        signature.push_str("\n */");
    }

    signature
}

/// Render every candidate signature, one per line group.
#[must_use]
pub fn render_signature_help(items: &SignatureHelpItems) -> String {
    items
        .items
        .iter()
        .map(render_signature)
        .collect::<Vec<_>>()
        .join("\n")
}
