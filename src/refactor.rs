use anyhow::{Context as _, Result};
use clap::{Args as ClapArgs, Parser as ClapParser, Subcommand};
use refactor::{
    import_ledger::ImportLedger,
    locate_all,
    scip_index::{Index, ScipBindings, ScipSearch},
    syntax::{NodeId, NodeKind, SyntaxTree},
    Binding, FileId, FsTextStore, ListPosition, MatchRange, MemberRelocationRewriter,
    RefactoringSession, RefactoringStatus, RelocationDescriptor, RewriteMode, RewriteSession,
    SearchEngine, SearchScope, SessionOptions,
};
use scip::types::SymbolRole;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};
use tracing::{info, Level};
use walkdir::WalkDir;

#[derive(ClapParser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Log more (-v for progress, -vv for every edit)
    #[clap(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Move static members to another type and update every reference
    MoveStatic(MoveStaticArgs),
    /// Report Java files that fail to parse or contain syntax errors
    Check {
        /// Directory to scan
        #[clap(value_parser)]
        path: PathBuf,
    },
}

#[derive(ClapArgs, Debug)]
struct MoveStaticArgs {
    /// Root folder of the Java project
    #[clap(value_parser)]
    path: PathBuf,

    /// Qualified name of the type declaring the members
    #[clap(long)]
    from: String,

    /// Qualified name of the type receiving the members
    #[clap(long)]
    to: String,

    /// Simple name of a member to move; repeat for several
    #[clap(long = "member", short = 'm', required = true)]
    members: Vec<String>,

    /// SCIP index of the project (defaults to the nearest index.scip above the project root)
    #[clap(long)]
    index: Option<PathBuf>,

    /// Packages whose types never need an import
    #[clap(long = "implicit-import", default_value = "java.lang")]
    implicit_imports: Vec<String>,

    /// Perform a dry run (print unified diffs instead of writing files)
    #[clap(long, short = 'd', action)]
    dry: bool,
}

fn main() -> Result<()> {
    let start_time = SystemTime::now();
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::MoveStatic(args) => move_static(args)?,
        Command::Check { path } => check(&path)?,
    }

    eprintln!(
        "Elapsed time: {:?}",
        SystemTime::now().duration_since(start_time)
    );
    Ok(())
}

fn move_static(args: MoveStaticArgs) -> Result<()> {
    let root = fs::canonicalize(&args.path)
        .with_context(|| format!("Failed to resolve {}", args.path.display()))?;
    let index_path = match &args.index {
        Some(index_path) => index_path.clone(),
        None => Index::find(&root)?,
    };
    let index = Arc::new(Index::load(&index_path)?);

    let mut members = Vec::new();
    for name in &args.members {
        let found: Vec<Binding> = index
            .members_of(&args.from)
            .into_iter()
            .map(|(_, binding)| binding)
            .filter(|binding| &binding.name == name)
            .collect();
        if found.is_empty() {
            anyhow::bail!("`{}` has no member named `{name}`", args.from);
        }
        if let Some(binding) = found.iter().find(|binding| !binding.is_static) {
            anyhow::bail!("`{}` is not static", binding.qualified_name);
        }
        members.extend(found);
    }
    let descriptor = RelocationDescriptor::new(&args.from, &args.to, members);

    let source_file = defining_file(&index, &args.from)?;
    let target_file = defining_file(&index, &args.to)?;
    if source_file == target_file {
        anyhow::bail!("`{}` and `{}` are declared in the same file", args.from, args.to);
    }

    let options = SessionOptions {
        implicit_import_packages: args.implicit_imports.clone(),
        ..SessionOptions::default()
    };
    let mut session = RefactoringSession::java(FsTextStore::new(root), options.clone())?;
    let bindings = ScipBindings::new(index.clone());
    let mut status = RefactoringStatus::new();

    let source_tree = session.tree(&source_file)?;
    let source_type = type_declaration(&source_tree, &args.from)?;
    let mut declarations = Vec::new();
    for name in args.members.iter().collect::<BTreeSet<_>>() {
        declarations.extend(member_declarations(&source_tree, source_type, name)?);
    }

    let target_tree = session.tree(&target_file)?;
    let target_type = type_declaration(&target_tree, &args.to)?;
    let target_body = target_tree
        .child_by_field(target_type, "body")
        .with_context(|| format!("`{}` has no body", args.to))?;

    // Moved code is rewritten on the side so the source file only sees the removals.
    let mut moved = RewriteSession::new(source_file.clone(), source_tree.clone(), &options);
    let mut moved_imports = ImportLedger::new(target_tree.clone());
    let rewriter = MemberRelocationRewriter::new(&descriptor, &bindings, RewriteMode::MovedMembers);
    let mut rendered = Vec::new();
    for declaration in &declarations {
        let outcome = rewriter.rewrite(&mut moved, &mut moved_imports, *declaration);
        status.merge(outcome.status);
        rendered.push(moved.render(*declaration)?);
    }

    {
        let (rewrite, ledger) = session.file_edits(&source_file)?;
        let group = rewrite.create_edit_group(format!("Move members to {}", args.to));
        for declaration in &declarations {
            rewrite.remove(*declaration, Some(group));
            ledger.register_removed_node(*declaration);
        }
    }
    {
        let (rewrite, ledger) = session.file_edits(&target_file)?;
        let group = rewrite.create_edit_group(format!("Move members from {}", args.from));
        let members = target_tree
            .children(target_body)
            .iter()
            .filter(|child| target_tree.kind(**child) != NodeKind::Comment)
            .count();
        let position = ListPosition::new(target_body, members);
        for text in rendered {
            rewrite.insert(position, text, Some(group));
        }
        for name in moved_imports.added() {
            ledger.register_added(name);
        }
    }

    let mut matches: BTreeMap<FileId, Vec<MatchRange>> = BTreeMap::new();
    {
        let search = ScipSearch::new(&index, session.store());
        for member in descriptor.members() {
            for found in search.search(&member.symbol, &SearchScope::Workspace, session.cancellation())? {
                matches.entry(found.file).or_default().push(found.range);
            }
        }
    }

    for (file, ranges) in matches {
        let tree = match session.tree(&file) {
            Ok(tree) => tree,
            Err(error) if error.is_file_fatal() => {
                status.add_engine_error(&error);
                continue;
            }
            Err(error) => return Err(error.into()),
        };
        let excluded = if file == source_file {
            declarations.clone()
        } else {
            Vec::new()
        };
        let references = locate_all(&tree, ranges)
            .into_iter()
            .filter(|node| !excluded.iter().any(|moved| tree.is_within(*node, *moved)))
            .count();
        if references == 0 {
            continue;
        }
        info!(%file, references, "updating references");

        let (rewrite, ledger) = session.file_edits(&file)?;
        let group = rewrite.create_edit_group(format!("Update references to {}", args.from));
        let outcome = MemberRelocationRewriter::new(&descriptor, &bindings, RewriteMode::References)
            .with_group(group)
            .excluding(excluded)
            .rewrite(rewrite, ledger, tree.root());
        status.merge(outcome.status);
    }

    let change_set = session.create_changes()?;
    status.merge(change_set.status());
    if !status.is_ok() {
        eprint!("{status}");
    }

    let changes: Vec<_> = change_set
        .changes
        .iter()
        .filter(|change| !change.is_empty())
        .collect();
    if args.dry {
        for change in &changes {
            print!("{}", change.unified_diff());
        }
    } else if status.has_error() {
        anyhow::bail!("Not writing changes because of the errors above; use --dry to inspect them");
    } else {
        for change in &changes {
            let full_path = session.store().full_path(change.file());
            fs::write(&full_path, change.new_text())
                .with_context(|| format!("Failed to write {}", full_path.display()))?;
        }
        println!("Changed {} files", changes.len());
    }
    Ok(())
}

/// The indexed file holding the definition of type `qualified_name`.
fn defining_file(index: &Index, qualified_name: &str) -> Result<FileId> {
    index
        .documents
        .values()
        .find(|document| {
            document.occurrences.iter().any(|occurrence| {
                occurrence.has_role(SymbolRole::Definition)
                    && index.binding(&occurrence.symbol).is_some_and(|binding| {
                        binding.is_type() && binding.qualified_name == qualified_name
                    })
            })
        })
        .map(|document| document.relative_path.clone())
        .with_context(|| format!("No indexed file defines `{qualified_name}`"))
}

fn type_declaration(tree: &SyntaxTree, qualified_name: &str) -> Result<NodeId> {
    tree.declared_types()
        .into_iter()
        .find(|(_, name)| name == qualified_name)
        .map(|(node, _)| node)
        .with_context(|| format!("`{qualified_name}` is not declared where the index says"))
}

fn member_declarations(tree: &SyntaxTree, type_declaration: NodeId, name: &str) -> Result<Vec<NodeId>> {
    let body = tree
        .child_by_field(type_declaration, "body")
        .context("type declaration has no body")?;
    let mut declarations = Vec::new();
    for member in tree.children(body).iter().copied() {
        match tree.kind(member) {
            NodeKind::MethodDeclaration if tree.declared_name(member) == Some(name) => {
                declarations.push(member);
            }
            NodeKind::FieldDeclaration => {
                let declarators: Vec<NodeId> = tree
                    .children(member)
                    .iter()
                    .copied()
                    .filter(|child| tree.kind(*child) == NodeKind::VariableDeclarator)
                    .collect();
                if declarators
                    .iter()
                    .any(|declarator| tree.declared_name(*declarator) == Some(name))
                {
                    if declarators.len() > 1 {
                        anyhow::bail!("`{name}` is declared together with other fields");
                    }
                    declarations.push(member);
                }
            }
            _ => {}
        }
    }
    if declarations.is_empty() {
        anyhow::bail!("No declaration of `{name}` found");
    }
    Ok(declarations)
}

fn check(path: &Path) -> Result<()> {
    let root = fs::canonicalize(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    let mut session = RefactoringSession::java(FsTextStore::new(root.clone()), SessionOptions::default())?;

    let mut checked = 0;
    let mut problems = 0;
    for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file()
            || !entry.path().extension().map_or(false, |ext| ext == "java")
        {
            continue;
        }
        let file = FileId::from(entry.path().strip_prefix(&root)?);
        checked += 1;
        match session.tree(&file) {
            Ok(tree) if tree.is_malformed() => {
                problems += 1;
                println!("{file}: contains syntax errors");
            }
            Ok(_) => {}
            Err(error) => {
                problems += 1;
                println!("{error}");
            }
        }
    }
    println!("Checked {checked} files, {problems} with problems");
    Ok(())
}
