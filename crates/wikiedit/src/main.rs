mod logging;

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info};
use wikiedit_core::config::{EditorConfig, load_config, resolve_config_path};
use wikiedit_core::diff::{EditSummary, summarize_edit, unified_diff};
use wikiedit_core::markup::{custom_header_fragment, gallery_files};
use wikiedit_core::{FieldData, PageEditor, RowItem, SectionHeader, WikitextScanner};

const STDIN_MARKER: &str = "-";

#[derive(Debug, Parser)]
#[command(
    name = "wikiedit",
    version,
    about = "Format-preserving editor for wikitext templates, parameters and sections"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        default_value = STDIN_MARKER,
        help = "Wikitext file to read (`-` for stdin)"
    )]
    input: PathBuf,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Write the edited text back to --input")]
    write: bool,
    #[arg(long, global = true, help = "Print a unified diff instead of the edited text")]
    diff: bool,
    #[arg(long, global = true, help = "Print results as JSON")]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    input: PathBuf,
    config: Option<PathBuf>,
    write: bool,
    diff: bool,
    json: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            input: cli.input.clone(),
            config: cli.config.clone(),
            write: cli.write,
            diff: cli.diff,
            json: cli.json,
        }
    }

    fn reads_stdin(&self) -> bool {
        self.input == Path::new(STDIN_MARKER)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Template(TemplateArgs),
    Param(ParamArgs),
    Section(SectionArgs),
    #[command(about = "Add, describe or remove a marker template such as {{Stub}}")]
    Flag(FlagArgs),
    Rows(RowsArgs),
    #[command(about = "Apply a JSON record through a configured [[mappings]] table")]
    Apply(ApplyArgs),
    Gallery(GalleryArgs),
}

#[derive(Debug, Args)]
struct TemplateArgs {
    #[command(subcommand)]
    command: TemplateCommand,
}

#[derive(Debug, Subcommand)]
enum TemplateCommand {
    Find { name: String },
    Ensure { name: String },
    Remove { name: String },
}

#[derive(Debug, Args)]
struct ParamArgs {
    #[command(subcommand)]
    command: ParamCommand,
}

#[derive(Debug, Subcommand)]
enum ParamCommand {
    Get { template: String, param: String },
    Set {
        template: String,
        param: String,
        value: String,
    },
    Remove { template: String, param: String },
    List { template: String },
}

#[derive(Debug, Args)]
struct SectionArgs {
    #[command(subcommand)]
    command: SectionCommand,
}

#[derive(Debug, Subcommand)]
enum SectionCommand {
    Get(SectionGetArgs),
    Replace(SectionReplaceArgs),
}

#[derive(Debug, Args)]
struct SectionGetArgs {
    header: String,
    #[arg(long, help = "Treat the header as a regex fragment")]
    pattern: bool,
}

#[derive(Debug, Args)]
struct SectionReplaceArgs {
    header: String,
    #[arg(long, conflicts_with = "content_file", help = "New section body")]
    content: Option<String>,
    #[arg(long, value_name = "PATH", help = "Read the new section body from a file")]
    content_file: Option<PathBuf>,
    #[arg(long, conflicts_with = "custom", help = "Treat the header as a regex fragment")]
    pattern: bool,
    #[arg(long, help = "Match bold-wrapped and underscore-spelled headers")]
    custom: bool,
    #[arg(long, value_name = "TITLE", help = "Title used when the section must be appended")]
    default_title: Option<String>,
}

#[derive(Debug, Args)]
struct FlagArgs {
    name: String,
    #[arg(long, help = "Remove the flag instead of setting it")]
    off: bool,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Debug, Args)]
struct RowsArgs {
    #[command(subcommand)]
    command: RowsCommand,
}

#[derive(Debug, Subcommand)]
enum RowsCommand {
    Get(RowsGetArgs),
    Set(RowsSetArgs),
}

#[derive(Debug, Args)]
struct RowsGetArgs {
    template: String,
    param: String,
    #[arg(long, help = "Row template parent (defaults to the template name)")]
    parent: Option<String>,
}

#[derive(Debug, Args)]
struct RowsSetArgs {
    template: String,
    param: String,
    #[arg(value_name = "ITEMS_JSON")]
    items: PathBuf,
    #[arg(long, help = "Row template parent (defaults to the template name)")]
    parent: Option<String>,
}

#[derive(Debug, Args)]
struct ApplyArgs {
    mapping: String,
    #[arg(value_name = "DATA_JSON")]
    data: PathBuf,
    #[arg(long, value_name = "VALUE", help = "Selector value for repeated templates")]
    select: Option<String>,
}

#[derive(Debug, Args)]
struct GalleryArgs {
    #[command(subcommand)]
    command: GalleryCommand,
}

#[derive(Debug, Subcommand)]
enum GalleryCommand {
    Get { section: String },
    Set { section: String, files: Vec<String> },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);
    let config_path = resolve_config_path(runtime.config.as_deref())?;
    let config = load_config(&config_path)?;
    logging::init(&config.log_filter());
    debug!(
        config = %normalize_path(&config_path),
        mappings = config.mappings.len(),
        "configuration loaded"
    );

    match cli.command {
        Commands::Template(TemplateArgs { command }) => match command {
            TemplateCommand::Find { name } => run_template_find(&runtime, &name),
            TemplateCommand::Ensure { name } => {
                edit_page(&runtime, |editor| Ok(editor.ensure_template(&name)))
            }
            TemplateCommand::Remove { name } => {
                edit_page(&runtime, |editor| Ok(editor.remove_template(&name)))
            }
        },
        Commands::Param(ParamArgs { command }) => match command {
            ParamCommand::Get { template, param } => run_param_get(&runtime, &template, &param),
            ParamCommand::Set {
                template,
                param,
                value,
            } => edit_page(&runtime, |editor| {
                Ok(editor.set_parameter(&template, &param, value.as_str()))
            }),
            ParamCommand::Remove { template, param } => edit_page(&runtime, |editor| {
                Ok(editor.remove_parameter(&template, &param))
            }),
            ParamCommand::List { template } => run_param_list(&runtime, &template),
        },
        Commands::Section(SectionArgs { command }) => match command {
            SectionCommand::Get(args) => run_section_get(&runtime, args),
            SectionCommand::Replace(args) => run_section_replace(&runtime, args),
        },
        Commands::Flag(args) => edit_page(&runtime, |editor| {
            Ok(editor.set_flag(&args.name, !args.off, args.description.as_deref()))
        }),
        Commands::Rows(RowsArgs { command }) => match command {
            RowsCommand::Get(args) => run_rows_get(&runtime, args),
            RowsCommand::Set(args) => run_rows_set(&runtime, args),
        },
        Commands::Apply(args) => run_apply(&runtime, &config, args),
        Commands::Gallery(GalleryArgs { command }) => match command {
            GalleryCommand::Get { section } => run_gallery_get(&runtime, &section),
            GalleryCommand::Set { section, files } => {
                edit_page(&runtime, |editor| Ok(editor.set_gallery(&section, &files)))
            }
        },
    }
}

fn run_template_find(runtime: &RuntimeOptions, name: &str) -> Result<()> {
    let scanner = WikitextScanner::new(read_input(runtime)?);
    let spans = scanner.find_templates(name);
    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&spans)?);
        return Ok(());
    }

    println!("template: {}", name.trim());
    println!("found: {}", format_flag(!spans.is_empty()));
    println!("instances: {}", spans.len());
    for span in &spans {
        println!(
            "instance: {}..{} params={}",
            span.start,
            span.end,
            scanner.template_parameters(span).len()
        );
    }
    Ok(())
}

fn run_param_get(runtime: &RuntimeOptions, template: &str, param: &str) -> Result<()> {
    let scanner = WikitextScanner::new(read_input(runtime)?);
    let found = scanner.find_parameter(template, param);
    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }

    println!("found: {}", format_flag(found.is_some()));
    if let Some(parameter) = found {
        println!("value: {}", parameter.value);
    }
    Ok(())
}

fn run_param_list(runtime: &RuntimeOptions, template: &str) -> Result<()> {
    let scanner = WikitextScanner::new(read_input(runtime)?);
    let Some(span) = scanner.find_template(template) else {
        bail!("template `{}` not found", template.trim());
    };
    let parameters = scanner.template_parameters(&span);
    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&parameters)?);
        return Ok(());
    }

    println!("template: {}", scanner.template_name(&span));
    println!("params.count: {}", parameters.len());
    for parameter in &parameters {
        println!("param.{}: {}", parameter.name.as_key(), parameter.value);
    }
    Ok(())
}

fn run_section_get(runtime: &RuntimeOptions, args: SectionGetArgs) -> Result<()> {
    let editor = PageEditor::new(read_input(runtime)?);
    let header = section_header(&args.header, args.pattern);
    let found = editor.section(&header);
    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }

    match found {
        Some(section) => print!("{}", section.content),
        None => println!("found: no"),
    }
    Ok(())
}

fn run_section_replace(runtime: &RuntimeOptions, args: SectionReplaceArgs) -> Result<()> {
    let content = match (&args.content, &args.content_file) {
        (Some(content), None) => content.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        _ => bail!("section replace requires exactly one of --content or --content-file"),
    };

    edit_page(runtime, |editor| {
        if args.custom {
            return Ok(editor.replace_custom_section(&args.header, &content));
        }
        let header = section_header(&args.header, args.pattern);
        Ok(editor.replace_section(&header, &content, args.default_title.as_deref()))
    })
}

fn run_rows_get(runtime: &RuntimeOptions, args: RowsGetArgs) -> Result<()> {
    let editor = PageEditor::new(read_input(runtime)?);
    let parent = args.parent.as_deref().unwrap_or(&args.template);
    let rows = editor.rows(&args.template, &args.param, parent);
    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("rows.count: {}", rows.len());
    for row in &rows {
        println!(
            "row: kind={} name={} extra={}",
            if row.kind.is_empty() { "<none>" } else { row.kind.as_str() },
            row.name,
            row.extra.as_deref().unwrap_or("<none>")
        );
    }
    Ok(())
}

fn run_rows_set(runtime: &RuntimeOptions, args: RowsSetArgs) -> Result<()> {
    let items = load_row_items(&args.items)?;
    let parent = args.parent.clone().unwrap_or_else(|| args.template.clone());
    edit_page(runtime, |editor| {
        Ok(editor.set_rows(&args.template, &args.param, &parent, &items))
    })
}

fn run_apply(runtime: &RuntimeOptions, config: &EditorConfig, args: ApplyArgs) -> Result<()> {
    let Some(mapping) = config.mapping(&args.mapping) else {
        bail!(
            "mapping `{}` is not defined (configured: {})",
            args.mapping,
            if config.mappings.is_empty() {
                "<none>".to_string()
            } else {
                config
                    .mappings
                    .iter()
                    .map(|table| table.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        );
    };
    let data = load_field_data(&args.data)?;
    let fields = mapping.field_mapping();

    edit_page(runtime, |editor| {
        let changed = match (&mapping.selector, &args.select) {
            (Some(selector), Some(value)) => {
                editor.update_template_instance(&mapping.template, selector, value, &data, &fields)
            }
            (Some(selector), None) => {
                bail!("mapping `{}` selects instances by `{selector}`; pass --select", mapping.name)
            }
            (None, Some(_)) => {
                bail!("mapping `{}` has no selector; drop --select", mapping.name)
            }
            (None, None) => editor.update_section(&mapping.template, &data, &fields),
        };
        info!(mapping = %mapping.name, changed, "mapping applied");
        Ok(changed > 0)
    })
}

fn run_gallery_get(runtime: &RuntimeOptions, section: &str) -> Result<()> {
    let editor = PageEditor::new(read_input(runtime)?);
    let header = SectionHeader::pattern(custom_header_fragment(section));
    let files = editor
        .section(&header)
        .map(|found| gallery_files(&found.content))
        .unwrap_or_default();
    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }

    println!("files.count: {}", files.len());
    for file in &files {
        println!("file: {file}");
    }
    Ok(())
}

/// Runs one mutation over the input page and reports the result according to
/// `--write`, `--diff` and `--json`.
fn edit_page(
    runtime: &RuntimeOptions,
    edit: impl FnOnce(&mut PageEditor) -> Result<bool>,
) -> Result<()> {
    if runtime.write && runtime.reads_stdin() {
        bail!("--write needs a file passed with --input, not stdin");
    }
    let before = read_input(runtime)?;
    let mut editor = PageEditor::new(before.clone());
    let applied = edit(&mut editor)?;
    let after = editor.into_text();
    let summary = summarize_edit(&before, &after);
    debug!(applied, changed = summary.changed, "edit finished");

    if runtime.write && summary.changed {
        fs::write(&runtime.input, &after)
            .with_context(|| format!("failed to write {}", runtime.input.display()))?;
    }

    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if runtime.diff {
        print!("{}", unified_diff(&before, &after, &diff_label(runtime)));
        print_summary(&summary);
    } else if runtime.write {
        println!("path: {}", normalize_path(&runtime.input));
        print_summary(&summary);
    } else {
        print!("{after}");
    }
    Ok(())
}

fn print_summary(summary: &EditSummary) {
    println!("changed: {}", format_flag(summary.changed));
    println!("bytes: {} -> {}", summary.bytes_before, summary.bytes_after);
    println!("hash: {} -> {}", summary.hash_before, summary.hash_after);
    println!("lines_added: {}", summary.lines_added);
    println!("lines_removed: {}", summary.lines_removed);
}

fn read_input(runtime: &RuntimeOptions) -> Result<String> {
    if runtime.reads_stdin() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read wikitext from stdin")?;
        return Ok(buffer);
    }
    fs::read_to_string(&runtime.input)
        .with_context(|| format!("failed to read {}", runtime.input.display()))
}

fn load_field_data(path: &Path) -> Result<FieldData> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => bail!("{} must contain a JSON object", path.display()),
    }
}

fn load_row_items(path: &Path) -> Result<Vec<RowItem>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn section_header(header: &str, pattern: bool) -> SectionHeader {
    if pattern {
        SectionHeader::pattern(header)
    } else {
        SectionHeader::literal(header)
    }
}

fn diff_label(runtime: &RuntimeOptions) -> String {
    if runtime.reads_stdin() {
        "stdin".to_string()
    } else {
        normalize_path(&runtime.input)
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
