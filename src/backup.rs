use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

// Same file name db::open_db uses; kept local so this module stands alone.
const DB_FILE_NAME: &str = "portale.sqlite3";

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/portale.sqlite3";
pub const BUNDLE_FORMAT_V1: &str = "portale-workspace-v1";

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    version: u32,
    #[serde(default)]
    app_version: String,
    #[serde(default)]
    exported_at: u64,
}

impl Manifest {
    fn current() -> Self {
        Manifest {
            format: BUNDLE_FORMAT_V1.to_string(),
            version: 1,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;

    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest =
        serde_json::to_string_pretty(&Manifest::current()).context("failed to serialize manifest")?;
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(manifest.as_bytes())
        .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    let mut db_file = File::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 2,
    })
}

pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;
    let dst = workspace_path.join(DB_FILE_NAME);

    if !is_zip_file(in_path)? {
        // Bare sqlite files are accepted as legacy imports.
        std::fs::copy(in_path, &dst).with_context(|| {
            format!(
                "failed to copy sqlite backup from {} to {}",
                in_path.to_string_lossy(),
                dst.to_string_lossy()
            )
        })?;
        return Ok(ImportSummary {
            bundle_format_detected: "legacy-sqlite3".to_string(),
        });
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let manifest = read_manifest(&mut archive)?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", manifest.format));
    }

    // Extract to a temp file, then rename over the target, so a truncated
    // bundle cannot leave a half-written database behind.
    let tmp_dst = workspace_path.join(format!("{}.importing", DB_FILE_NAME));
    if tmp_dst.exists() {
        let _ = std::fs::remove_file(&tmp_dst);
    }
    {
        let mut db_entry = archive
            .by_name(DB_ENTRY)
            .with_context(|| format!("bundle missing {}", DB_ENTRY))?;
        let mut db_out = File::create(&tmp_dst).with_context(|| {
            format!(
                "failed to create temp database {}",
                tmp_dst.to_string_lossy()
            )
        })?;
        std::io::copy(&mut db_entry, &mut db_out).context("failed to extract database entry")?;
        db_out
            .flush()
            .context("failed to flush extracted database")?;
    }

    if dst.exists() {
        std::fs::remove_file(&dst).with_context(|| {
            format!(
                "failed to remove existing database {}",
                dst.to_string_lossy()
            )
        })?;
    }
    std::fs::rename(&tmp_dst, &dst).with_context(|| {
        format!(
            "failed to move extracted database to {}",
            dst.to_string_lossy()
        )
    })?;

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
    })
}

fn read_manifest(archive: &mut ZipArchive<File>) -> anyhow::Result<Manifest> {
    let mut text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut text)
        .context("failed to read manifest.json")?;
    serde_json::from_str(&text).context("manifest.json is invalid JSON")
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    Ok(read == 4 && sig == ZIP_MAGIC)
}
