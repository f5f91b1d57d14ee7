use super::{NodeId, NodeKind, SyntaxTree, TreeBuilder};
use crate::{
    error::{EngineError, Result},
    source::FileId,
};
use std::sync::Arc;
use tree_sitter::{Parser, TreeCursor};

/// Turns file contents into a syntax tree. Implementations must be deterministic.
pub trait SourceParser {
    fn parse(&mut self, file: &FileId, text: Arc<str>) -> Result<SyntaxTree>;
}

pub struct JavaParser {
    parser: Parser,
}

impl JavaParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_java::LANGUAGE.into())
            .map_err(|e| EngineError::ParserSetup(e.to_string()))?;
        Ok(JavaParser { parser })
    }
}

impl SourceParser for JavaParser {
    fn parse(&mut self, file: &FileId, text: Arc<str>) -> Result<SyntaxTree> {
        let tree = self
            .parser
            .parse(text.as_bytes(), None)
            .ok_or_else(|| EngineError::ParseFailure {
                file: file.clone(),
                message: "parser produced no tree".to_string(),
            })?;
        let root_node = tree.root_node();

        let mut builder = TreeBuilder::new(text.clone());
        if root_node.has_error() {
            builder.mark_malformed();
        }
        let root = builder.root(NodeKind::from_grammar_name(root_node.kind()));
        let mut cursor = root_node.walk();
        add_named_children(&mut builder, &mut cursor, root);
        Ok(builder.build())
    }
}

/// Copies the named children under the cursor's node into the builder. Anonymous nodes
/// (punctuation and keywords) are tokens and never have named children.
fn add_named_children(builder: &mut TreeBuilder, cursor: &mut TreeCursor, parent: NodeId) {
    if !cursor.goto_first_child() {
        return;
    }
    loop {
        let node = cursor.node();
        if node.is_named() {
            let id = builder.node_with_field(
                parent,
                NodeKind::from_grammar_name(node.kind()),
                node.byte_range(),
                cursor.field_name(),
            );
            add_named_children(builder, cursor, id);
        }
        if !cursor.goto_next_sibling() {
            break;
        }
    }
    cursor.goto_parent();
}
