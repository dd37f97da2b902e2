use comrak::nodes::{AstNode, NodeValue};

use crate::application::render::types::FootnoteEntry;

/// Record the footnote definitions the parser kept, numbered in display order.
///
/// The parser already links references to definitions, drops definitions that
/// are never referenced and moves the rest to the end of the document.
pub(crate) fn collect_footnotes<'a>(root: &'a AstNode<'a>) -> Vec<FootnoteEntry> {
    let mut footnotes = Vec::new();
    let mut child = root.first_child();
    while let Some(node) = child {
        if let NodeValue::FootnoteDefinition(definition) = &node.data.borrow().value {
            let number = u32::try_from(footnotes.len() + 1).unwrap_or(u32::MAX);
            footnotes.push(FootnoteEntry {
                number,
                name: definition.name.clone(),
                references: definition.total_references,
            });
        }
        child = node.next_sibling();
    }
    footnotes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::service::{config::comrak_options, options::PipelineOptions};
    use comrak::{Arena, parse_document};

    fn footnotes_of(markdown: &str, options: &PipelineOptions) -> Vec<FootnoteEntry> {
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &comrak_options(options));
        collect_footnotes(root)
    }

    #[test]
    fn records_referenced_definitions_in_reference_order() {
        let markdown = "Second[^b] then first[^a] and again[^b].\n\n[^a]: A.\n[^b]: B.\n[^unused]: U.\n";
        let footnotes = footnotes_of(markdown, &PipelineOptions::default());

        assert_eq!(footnotes.len(), 2);
        assert_eq!(footnotes[0].name, "b");
        assert_eq!(footnotes[0].number, 1);
        assert_eq!(footnotes[0].references, 2);
        assert_eq!(footnotes[1].name, "a");
        assert_eq!(footnotes[1].references, 1);
    }

    #[test]
    fn inline_notes_follow_the_option() {
        let markdown = "Text with a note.^[Inline body]\n";

        let enabled = footnotes_of(markdown, &PipelineOptions::default());
        assert_eq!(enabled.len(), 1);

        let mut options = PipelineOptions::default();
        options.footnotes.inline_notes = false;
        assert!(footnotes_of(markdown, &options).is_empty());
    }
}
