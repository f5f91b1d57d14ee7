//! Bindings and search backed by a SCIP index (as produced by `scip-java`).

use crate::{
    binding::{Binding, BindingKind, BindingResolver, Origin},
    error::Result as EngineResult,
    locator::MatchRange,
    search::{SearchEngine, SearchMatch, SearchScope},
    source::{acquire_text, CancellationToken, FileId, TextStore},
    syntax::{LineIndex, NodeId, Point, SyntaxTree},
};
use anyhow::{Context as _, Result};
use itertools::Itertools;
use protobuf::Message;
use scip::types::SymbolRole;
use std::{
    collections::{HashMap, HashSet},
    fs,
    ops::Range,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct Index {
    pub project_root: Arc<str>,
    pub documents: HashMap<FileId, Document>,
    pub symbols: HashMap<Arc<str>, SymbolInformation>,
    /// Global symbols with a definition occurrence in some indexed document.
    pub defined: HashSet<Arc<str>>,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub relative_path: FileId,
    /// Sorted by start position.
    pub occurrences: Vec<Occurrence>,
}

#[derive(Debug, Clone)]
pub struct Occurrence {
    pub range: Range<Point>,
    pub symbol: Arc<str>,
    pub symbol_roles: i32,
}

impl Occurrence {
    pub fn has_role(&self, role: SymbolRole) -> bool {
        self.symbol_roles & (role as i32) != 0
    }

    pub fn is_local(&self) -> bool {
        self.symbol.starts_with("local ")
    }
}

#[derive(Debug, Clone)]
pub struct SymbolInformation {
    pub symbol: Arc<str>,
    pub display_name: Arc<str>,
    pub documentation: Vec<Arc<str>>,
    pub signature: Option<Arc<str>>,
}

impl SymbolInformation {
    /// Whether the declaration's signature carries the `static` modifier.
    pub fn is_static(&self) -> bool {
        self.signature
            .iter()
            .chain(self.documentation.iter())
            .any(|text| {
                text.split(|c: char| !c.is_alphanumeric())
                    .any(|word| word == "static")
            })
    }
}

impl Index {
    pub fn find(path: &Path) -> Result<PathBuf> {
        let mut current_dir = path.to_path_buf();
        loop {
            let potential_index_path = current_dir.join("index.scip");
            if potential_index_path.exists() {
                return Ok(potential_index_path);
            }
            if !current_dir.pop() {
                anyhow::bail!("Failed to find index.scip in any ancestor of {}", path.display());
            }
        }
    }

    pub fn load(index_path: &Path) -> Result<Index> {
        let buffer = fs::read(index_path)
            .with_context(|| format!("Failed to read index file: {}", index_path.display()))?;
        let index = scip::types::Index::parse_from_bytes(&buffer)
            .context("Failed to parse index from bytes")?;
        info!(documents = index.documents.len(), "loaded SCIP index");
        Ok(index.into())
    }

    pub fn document(&self, file: &FileId) -> Option<&Document> {
        self.documents.get(file)
    }

    /// Global symbols whose descriptors name `qualified_name`'s members, e.g. every
    /// `p/A#COUNT.` for `p.A`.
    pub fn members_of(&self, qualified_type: &str) -> Vec<(Arc<str>, Binding)> {
        self.defined
            .iter()
            .filter_map(|symbol| Some((symbol.clone(), self.binding(symbol)?)))
            .filter(|(_, binding)| binding.is_declared_by(qualified_type))
            .sorted_by(|a, b| a.0.cmp(&b.0))
            .collect()
    }

    /// The binding a global or local symbol stands for.
    pub fn binding(&self, symbol: &Arc<str>) -> Option<Binding> {
        if let Some(name) = symbol.strip_prefix("local ") {
            return Some(Binding {
                symbol: symbol.clone(),
                ..Binding::local(name)
            });
        }
        let descriptors = parse_descriptors(symbol)?;
        let (last, path) = descriptors.split_last()?;
        let container = path.iter().map(Descriptor::name).join(".");
        let qualify = |name: &str| {
            if container.is_empty() {
                name.to_string()
            } else {
                format!("{container}.{name}")
            }
        };
        let (kind, name) = match last {
            Descriptor::Namespace(name) => (BindingKind::Package, name),
            Descriptor::Type(name) => (BindingKind::Type, name),
            Descriptor::Term(name) => (BindingKind::Field, name),
            Descriptor::Method(name) if name == "<init>" => (BindingKind::Constructor, name),
            Descriptor::Method(name) => (BindingKind::Method, name),
            Descriptor::Other(name) => (BindingKind::Other, name),
        };
        let declaring_type = match path.last() {
            Some(Descriptor::Type(_)) => Some(container.clone()),
            _ => None,
        };
        let info = self.symbols.get(symbol);
        Some(Binding {
            symbol: symbol.clone(),
            name: name.clone(),
            qualified_name: qualify(name),
            kind,
            declaring_type,
            is_static: info.is_some_and(SymbolInformation::is_static),
            origin: if self.defined.contains(symbol) {
                Origin::Source
            } else {
                Origin::Binary
            },
        })
    }
}

impl Document {
    /// The occurrence spanning exactly `range`.
    pub fn find_occurrence(&self, range: &Range<Point>) -> Option<&Occurrence> {
        let start = self
            .occurrences
            .partition_point(|occ| occ.range.start < range.start);
        self.occurrences[start..]
            .iter()
            .take_while(|occ| occ.range.start == range.start)
            .find(|occ| occ.range.end == range.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
    Namespace(String),
    Type(String),
    Term(String),
    Method(String),
    Other(String),
}

impl Descriptor {
    pub fn name(&self) -> &str {
        match self {
            Descriptor::Namespace(name)
            | Descriptor::Type(name)
            | Descriptor::Term(name)
            | Descriptor::Method(name)
            | Descriptor::Other(name) => name,
        }
    }
}

/// Splits the descriptor part of a global SCIP symbol,
/// `scheme manager package version descriptors...`.
pub fn parse_descriptors(symbol: &str) -> Option<Vec<Descriptor>> {
    let text = symbol.splitn(5, ' ').nth(4)?;
    let chars: Vec<char> = text.chars().collect();
    let mut descriptors = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        // Type and term parameters, `[T]` and `(x)`, carry nothing the engine needs.
        if chars[i] == '[' || chars[i] == '(' {
            let close = if chars[i] == '[' { ']' } else { ')' };
            i += chars[i..].iter().position(|c| *c == close)? + 1;
            continue;
        }
        let name = if chars[i] == '`' {
            let len = chars[i + 1..].iter().position(|c| *c == '`')?;
            let name: String = chars[i + 1..i + 1 + len].iter().collect();
            i += len + 2;
            name
        } else {
            let len = chars[i..]
                .iter()
                .position(|c| !(c.is_alphanumeric() || matches!(c, '_' | '$' | '+' | '-')))
                .unwrap_or(chars.len() - i);
            let name: String = chars[i..i + len].iter().collect();
            i += len;
            name
        };
        let suffix = *chars.get(i)?;
        i += 1;
        descriptors.push(match suffix {
            '/' => Descriptor::Namespace(name),
            '#' => Descriptor::Type(name),
            '.' => Descriptor::Term(name),
            '(' => {
                i += chars[i..].iter().position(|c| *c == ')')? + 1;
                if chars.get(i) != Some(&'.') {
                    return None;
                }
                i += 1;
                Descriptor::Method(name)
            }
            _ => Descriptor::Other(name),
        });
    }
    Some(descriptors)
}

impl From<scip::types::Index> for Index {
    fn from(index: scip::types::Index) -> Self {
        let mut documents = HashMap::new();
        let mut symbols = HashMap::new();
        let mut defined = HashSet::new();

        let external = index.external_symbols.into_iter();
        for document in index.documents {
            for symbol_info in document.symbols {
                let converted = SymbolInformation::from(symbol_info);
                symbols.insert(converted.symbol.clone(), converted);
            }
            let occurrences = document
                .occurrences
                .into_iter()
                .filter_map(|occ| Occurrence::try_from(occ).ok())
                .inspect(|occ| {
                    if occ.has_role(SymbolRole::Definition) && !occ.is_local() {
                        defined.insert(occ.symbol.clone());
                    }
                })
                .sorted_by_key(|occ| (occ.range.start, occ.range.end))
                .collect();

            let relative_path = FileId::from(Path::new(&document.relative_path));
            documents.insert(
                relative_path.clone(),
                Document {
                    relative_path,
                    occurrences,
                },
            );
        }
        for symbol_info in external {
            let converted = SymbolInformation::from(symbol_info);
            symbols.entry(converted.symbol.clone()).or_insert(converted);
        }

        Index {
            project_root: index
                .metadata
                .0
                .map(|metadata| metadata.project_root.into())
                .unwrap_or_else(|| "".into()),
            documents,
            symbols,
            defined,
        }
    }
}

impl TryFrom<scip::types::Occurrence> for Occurrence {
    type Error = anyhow::Error;

    /// SCIP ranges are `[line, start, end]` or `[start line, start, end line, end]`.
    fn try_from(occurrence: scip::types::Occurrence) -> Result<Self> {
        let range: Vec<usize> = occurrence
            .range
            .iter()
            .map(|n| usize::try_from(*n))
            .collect::<Result<_, _>>()
            .context("negative position in occurrence range")?;
        let (start, end) = match range[..] {
            [line, start, end] => ((line, start), (line, end)),
            [start_line, start, end_line, end] => ((start_line, start), (end_line, end)),
            _ => anyhow::bail!("malformed occurrence range {:?}", occurrence.range),
        };
        Ok(Occurrence {
            range: Point {
                row: start.0,
                column: start.1,
            }..Point {
                row: end.0,
                column: end.1,
            },
            symbol: occurrence.symbol.into(),
            symbol_roles: occurrence.symbol_roles,
        })
    }
}

impl From<scip::types::SymbolInformation> for SymbolInformation {
    fn from(symbol_info: scip::types::SymbolInformation) -> Self {
        SymbolInformation {
            symbol: symbol_info.symbol.into(),
            display_name: symbol_info.display_name.into(),
            documentation: symbol_info
                .documentation
                .into_iter()
                .map(Into::into)
                .collect(),
            signature: symbol_info
                .signature_documentation
                .0
                .map(|doc| doc.text.into()),
        }
    }
}

/// Resolves nodes through the occurrence spanning exactly the node's range.
pub struct ScipBindings {
    index: Arc<Index>,
}

impl ScipBindings {
    pub fn new(index: Arc<Index>) -> Self {
        ScipBindings { index }
    }
}

impl BindingResolver for ScipBindings {
    fn resolve(&self, file: &FileId, tree: &SyntaxTree, node: NodeId) -> Option<Binding> {
        let occurrence = self
            .index
            .document(file)?
            .find_occurrence(&tree.point_range(node))?;
        self.index.binding(&occurrence.symbol)
    }
}

/// Finds references to a global symbol. The pattern is the SCIP symbol itself.
pub struct ScipSearch<'a> {
    index: &'a Index,
    store: &'a dyn TextStore,
}

impl<'a> ScipSearch<'a> {
    pub fn new(index: &'a Index, store: &'a dyn TextStore) -> Self {
        ScipSearch { index, store }
    }
}

impl SearchEngine for ScipSearch<'_> {
    fn search(
        &self,
        pattern: &str,
        scope: &SearchScope,
        cancel: &CancellationToken,
    ) -> EngineResult<Vec<SearchMatch>> {
        let mut matches = Vec::new();
        let documents = self
            .index
            .documents
            .values()
            .filter(|document| scope.contains(&document.relative_path))
            .sorted_by(|a, b| a.relative_path.cmp(&b.relative_path));
        for document in documents {
            let references: Vec<&Occurrence> = document
                .occurrences
                .iter()
                .filter(|occ| &*occ.symbol == pattern && !occ.has_role(SymbolRole::Definition))
                .collect();
            if references.is_empty() {
                continue;
            }
            cancel.check("searching")?;
            let text = acquire_text(self.store, &document.relative_path, cancel)?;
            let lines = LineIndex::new(text.text());
            for occurrence in references {
                let start = lines.offset(occurrence.range.start);
                let end = lines.offset(occurrence.range.end);
                let (Some(start), Some(end)) = (start, end) else {
                    debug!(file = %document.relative_path, "occurrence outside of file text");
                    continue;
                };
                matches.push(SearchMatch {
                    file: document.relative_path.clone(),
                    range: MatchRange::new(start, end.saturating_sub(start)),
                });
            }
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        source::FsTextStore,
        syntax::{JavaParser, NodeKind, SourceParser},
    };
    use protobuf::MessageField;

    const A: &str = "package p;\n\nclass A {\n    static int COUNT = 0;\n}\n";
    const C: &str = "package q;\n\nclass C {\n    int f() {\n        return p.A.COUNT;\n    }\n}\n";

    fn occurrence(range: Vec<i32>, symbol: &str, roles: i32) -> scip::types::Occurrence {
        scip::types::Occurrence {
            range,
            symbol: symbol.to_string(),
            symbol_roles: roles,
            ..Default::default()
        }
    }

    fn index() -> Index {
        let count = "semanticdb maven . . p/A#COUNT.";
        let type_a = "semanticdb maven . . p/A#";
        let definition = SymbolRole::Definition as i32;
        let mut raw = scip::types::Index::new();
        raw.documents.push(scip::types::Document {
            relative_path: "p/A.java".to_string(),
            occurrences: vec![
                occurrence(vec![3, 15, 20], count, definition),
                occurrence(vec![2, 6, 7], type_a, definition),
            ],
            symbols: vec![scip::types::SymbolInformation {
                symbol: count.to_string(),
                display_name: "COUNT".to_string(),
                signature_documentation: MessageField::some(scip::types::Document {
                    text: "static int COUNT".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        });
        raw.documents.push(scip::types::Document {
            relative_path: "q/C.java".to_string(),
            occurrences: vec![
                occurrence(vec![4, 19, 24], count, 0),
                occurrence(vec![4, 17, 18], type_a, 0),
                occurrence(vec![3, 4, 7], "semanticdb maven jdk 11 java/lang/String#", 0),
            ],
            ..Default::default()
        });
        raw.into()
    }

    #[test]
    fn test_descriptors() {
        assert_eq!(
            parse_descriptors("semanticdb maven maven/g/a 1.0 com/x/Outer#Inner#run(+1)."),
            Some(vec![
                Descriptor::Namespace("com".to_string()),
                Descriptor::Namespace("x".to_string()),
                Descriptor::Type("Outer".to_string()),
                Descriptor::Type("Inner".to_string()),
                Descriptor::Method("run".to_string()),
            ])
        );
        assert_eq!(
            parse_descriptors("semanticdb maven . . p/A#`<init>`().(x)"),
            Some(vec![
                Descriptor::Namespace("p".to_string()),
                Descriptor::Type("A".to_string()),
                Descriptor::Method("<init>".to_string()),
            ])
        );
        assert_eq!(parse_descriptors("local 3"), None);
    }

    #[test]
    fn test_bindings_from_symbols() {
        let index = index();
        let count = index
            .binding(&Arc::from("semanticdb maven . . p/A#COUNT."))
            .unwrap();
        assert_eq!(count.kind, BindingKind::Field);
        assert_eq!(count.qualified_name, "p.A.COUNT");
        assert_eq!(count.declaring_type.as_deref(), Some("p.A"));
        assert!(count.is_static);
        assert_eq!(count.origin, Origin::Source);

        let string = index
            .binding(&Arc::from("semanticdb maven jdk 11 java/lang/String#"))
            .unwrap();
        assert!(string.is_type());
        assert_eq!(string.qualified_name, "java.lang.String");
        assert_eq!(string.declaring_type, None);
        assert_eq!(string.origin, Origin::Binary);

        let members = index.members_of("p.A");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].1.name, "COUNT");
    }

    #[test]
    fn test_resolves_nodes_by_exact_range() {
        let file = FileId::from("q/C.java");
        let tree = JavaParser::new().unwrap().parse(&file, C.into()).unwrap();
        let bindings = ScipBindings::new(Arc::new(index()));
        let named = |text: &str| {
            tree.descendants(tree.root())
                .find(|node| tree.kind(*node) == NodeKind::Identifier && tree.text(*node) == text)
                .unwrap()
        };
        let count = bindings.resolve(&file, &tree, named("COUNT")).unwrap();
        assert_eq!(count.qualified_name, "p.A.COUNT");
        let a = bindings.resolve(&file, &tree, named("A")).unwrap();
        assert!(a.is_type());
        assert_eq!(bindings.resolve(&file, &tree, named("f")), None);
    }

    #[test]
    fn test_search_reports_byte_ranges_of_references() {
        let store = FsTextStore::in_memory()
            .with_working_copy("p/A.java", A)
            .with_working_copy("q/C.java", C);
        let index = index();
        let search = ScipSearch::new(&index, &store);
        let matches = search
            .search(
                "semanticdb maven . . p/A#COUNT.",
                &SearchScope::Workspace,
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(
            matches,
            vec![SearchMatch {
                file: FileId::from("q/C.java"),
                range: MatchRange::new(C.find("COUNT").unwrap(), 5),
            }]
        );
    }
}
