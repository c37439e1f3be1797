use clap::{Parser, Subcommand};
use memory_vault::artifact::{CroppedArtifact, PreviewRegistry};
use memory_vault::config::{self, VaultConfig};
use memory_vault::data_service::LocalDataService;
use memory_vault::draft::SnapshotStore;
use memory_vault::flow::{FlowError, FlowOptions, UploadFlow};
use memory_vault::imaging::{
    ImageBackend, RustBackend, compress_if_needed, plan_crop, render_crop,
};
use memory_vault::output::{self, CropContext};
use memory_vault::types::AspectPreset;
use memory_vault::viewport::Viewport;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Viewport flags shared by `crop` and `upload`.
#[derive(clap::Args, Clone)]
struct ViewArgs {
    /// Output shape [default: square, or the draft's preset with --resume]
    #[arg(long)]
    preset: Option<AspectPreset>,

    /// Zoom factor (clamped to the preset's cover fit and the configured maximum)
    #[arg(long)]
    zoom: Option<f64>,

    /// Horizontal pan offset, in viewport units
    #[arg(long, allow_hyphen_values = true)]
    offset_x: Option<f64>,

    /// Vertical pan offset, in viewport units
    #[arg(long, allow_hyphen_values = true)]
    offset_y: Option<f64>,
}

#[derive(clap::Args, Clone)]
struct UploadArgs {
    /// Source image
    input: PathBuf,

    /// Account the post belongs to
    #[arg(long)]
    owner: String,

    /// Post caption
    #[arg(long)]
    caption: Option<String>,

    #[command(flatten)]
    view: ViewArgs,

    /// Start from the owner's saved draft
    #[arg(long)]
    resume: bool,
}

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "memory-vault")]
#[command(about = "Crop, compress and post photos to a memory vault")]
#[command(long_about = "\
Crop, compress and post photos to a memory vault

A post goes through three stages:

  1. Compress   files over the byte budget are resized and re-encoded as JPEG
  2. Crop       the image is cropped to a preset at the given zoom and pan
  3. Upload     the crop is stored and a post record is created

Presets:

  square     1:1     1080x1080
  portrait   4:5     1080x1350
  landscape  1.91:1  1080x566
  story      9:16    1080x1920
  profile    1:1     400x400, circular mask, smaller compression budget

Pan offsets are in viewport units. The largest usable offset grows with zoom;
at the cover fit (minimum zoom) the image cannot be panned at all.

Storage layout:

  vault-data/
  ├── storage/<owner>/<millis>-<id>.jpg   # Uploaded crops
  ├── records.json                         # Post records
  └── drafts/<owner>.json                  # Unfinished sessions

An upload that fails keeps its draft; run the same command with --resume to
pick the caption, preset and viewport back up.

Run 'memory-vault gen-config' to generate a documented vault.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Storage root (overrides `storage.root` from the config)
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the aspect presets
    Presets,
    /// Crop one image to a preset and write the JPEG
    Crop {
        /// Source image
        input: PathBuf,
        #[command(flatten)]
        view: ViewArgs,
        /// Output file (default: <input stem>-<preset>.jpg next to the input)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Crop an image and post it
    Upload(UploadArgs),
    /// Inspect or discard saved drafts
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },
    /// Print a stock vault.toml with all options documented
    GenConfig,
}

#[derive(Subcommand)]
enum DraftAction {
    /// Show the owner's draft
    Show {
        #[arg(long)]
        owner: String,
    },
    /// Delete the owner's draft
    Clear {
        #[arg(long)]
        owner: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Presets => output::print_presets(),
        Command::Crop { input, view, out } => {
            let config = config::load_config(&cli.config)?;
            let preset = view.preset.unwrap_or_default();
            let out = out.unwrap_or_else(|| default_crop_path(&input, preset));
            crop_file(&config, &input, &view, &out)?;
        }
        Command::Upload(args) => {
            let config = config::load_config(&cli.config)?;
            let root = storage_root(&config, cli.storage.as_deref());
            let drafts = SnapshotStore::new(root.join("drafts"));
            let service = Arc::new(LocalDataService::new(root));
            upload_file(&config, service, drafts, &args).await?;
        }
        Command::Draft { action } => {
            let config = config::load_config(&cli.config)?;
            let drafts =
                SnapshotStore::new(storage_root(&config, cli.storage.as_deref()).join("drafts"));
            match action {
                DraftAction::Show { owner } => match drafts.load(&owner).await? {
                    Some(snapshot) => output::print_draft(&snapshot),
                    None => println!("No draft for {owner}"),
                },
                DraftAction::Clear { owner } => {
                    if drafts.clear(&owner).await? {
                        println!("Removed draft for {owner}");
                    } else {
                        println!("No draft for {owner}");
                    }
                }
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// `--storage` wins over `storage.root`.
fn storage_root(config: &VaultConfig, cli_storage: Option<&Path>) -> PathBuf {
    cli_storage
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.storage.root_path())
}

fn default_crop_path(input: &Path, preset: AspectPreset) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "crop".to_string());
    input.with_file_name(format!("{stem}-{preset}.jpg"))
}

fn file_label(input: &Path) -> String {
    input
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string())
}

/// One-shot crop: the same compress → viewport → render path as an upload,
/// without a session.
fn crop_file(
    config: &VaultConfig,
    input: &Path,
    view: &ViewArgs,
    out: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = FlowOptions::from_config(config);
    let backend = RustBackend::new();
    let name = file_label(input);

    let bytes = Arc::new(std::fs::read(input)?);
    let preset = view.preset.unwrap_or_default();
    let compressed = compress_if_needed(&backend, &name, bytes, options.profile_for(preset));
    output::print_compress_status(&name, &compressed.status, compressed.bytes.len());

    let dims = backend.identify(&compressed.bytes)?;
    let mut viewport = Viewport::new(preset.ratio(), options.max_zoom);
    viewport.set_natural(dims.as_tuple());
    viewport.reset();
    apply_view(&mut viewport, view);
    let rect = viewport
        .source_rect()
        .ok_or("image has no usable dimensions")?;

    let params = plan_crop(rect, &preset.spec(), &options.crop);
    let jpeg = render_crop(&backend, &compressed.bytes, &params)?;
    std::fs::write(out, &jpeg)?;

    let registry = PreviewRegistry::new();
    let artifact = CroppedArtifact::new(1, preset, jpeg, &registry);
    let saved_to = out.display().to_string();
    output::print_crop_result(
        &artifact.view(),
        &CropContext {
            natural: dims.as_tuple(),
            rect,
            zoom: viewport.zoom(),
            min_zoom: viewport.min_zoom(),
            max_zoom: viewport.max_zoom(),
            saved_to: Some(&saved_to),
        },
    );
    Ok(())
}

fn apply_view(viewport: &mut Viewport, view: &ViewArgs) {
    if let Some(zoom) = view.zoom {
        viewport.set_zoom(zoom);
    }
    let (x, y) = viewport.offset();
    viewport.set_offset(view.offset_x.unwrap_or(x), view.offset_y.unwrap_or(y));
}

async fn upload_file(
    config: &VaultConfig,
    service: Arc<LocalDataService>,
    drafts: SnapshotStore,
    args: &UploadArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(RustBackend::new());
    let options = FlowOptions::from_config(config);
    let view = &args.view;
    let owner = args.owner.as_str();
    let mut flow = UploadFlow::open(
        backend,
        service,
        owner,
        view.preset.unwrap_or_default(),
        options,
    )?
    .with_drafts(drafts);

    if args.resume {
        match flow.resume_draft().await? {
            Some(snapshot) => output::print_draft(&snapshot),
            None => println!("No draft for {owner}, starting fresh"),
        }
        if let Some(preset) = view.preset {
            flow.set_preset(preset)?;
        }
    }
    if let Some(caption) = &args.caption {
        flow.set_caption(caption.clone());
    }

    let name = file_label(&args.input);
    let bytes = tokio::fs::read(&args.input).await?;
    let status = flow.choose_file(&name, bytes).await?;
    let final_len = flow.session().source().map_or(0, |s| s.len());
    output::print_compress_status(&name, &status, final_len);

    if let Some(zoom) = view.zoom {
        flow.set_zoom(zoom)?;
    }
    if view.offset_x.is_some() || view.offset_y.is_some() {
        let (x, y) = flow.session().viewport().offset();
        flow.set_offset(view.offset_x.unwrap_or(x), view.offset_y.unwrap_or(y))?;
    }

    if let Some(artifact) = flow.settle().await? {
        let viewport = flow.session().viewport();
        if let (Some(rect), Some(natural)) = (viewport.source_rect(), viewport.natural()) {
            output::print_crop_result(
                &artifact,
                &CropContext {
                    natural,
                    rect,
                    zoom: viewport.zoom(),
                    min_zoom: viewport.min_zoom(),
                    max_zoom: viewport.max_zoom(),
                    saved_to: None,
                },
            );
        }
    }

    let cancel = flow.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, cancelling upload");
            cancel.set();
        }
    });
    let printer = tokio::spawn(output::follow_progress(
        flow.session().progress(),
        |line| eprintln!("{line}"),
    ));

    let result = flow.submit().await;
    interrupt.abort();
    if result.is_ok() {
        // The printer stops by itself once it has shown 100%
        if tokio::time::timeout(Duration::from_millis(500), printer).await.is_err() {
            log::debug!("progress printer did not finish");
        }
    } else {
        printer.abort();
    }

    match result {
        Ok(post) => {
            output::print_post(&post);
            Ok(())
        }
        Err(FlowError::Upload(e)) => {
            output::print_upload_error(&e);
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
