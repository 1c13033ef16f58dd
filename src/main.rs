//! rviewer 命令行
//!
//! 打开一个 PDF（不给文件时使用内置示例文档），按需要输入密码、跳页、缩放，
//! 把渲染好的页面保存成 PNG。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

use rviewer::decoder::PdfDecoder;
use rviewer::{
    CacheDirResolver, SessionState, SourceReference, SourceResolver, ViewerConfig, ViewerState,
};

/// Render pages of a PDF document to PNG files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// PDF file to open; the bundled sample is used when omitted
    file: Option<PathBuf>,

    /// Password for encrypted documents
    #[arg(short, long)]
    password: Option<String>,

    /// Page to render (1-based)
    #[arg(long, default_value = "1")]
    page: usize,

    /// Zoom factor applied to the page
    #[arg(short, long, default_value = "1.0")]
    zoom: f32,

    /// Render every page instead of a single one
    #[arg(short, long)]
    all: bool,

    /// Output directory for the PNG files
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Seconds to wait for each decode step
    #[arg(long, default_value = "60")]
    timeout: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        Env::default().default_filter_or("info"), // 默认日志级别：info
    )
    .init();

    let args = Args::parse();
    let config = ViewerConfig::from_env();
    let timeout = Duration::from_secs(args.timeout.max(1));

    let resolver = CacheDirResolver::from_config(&config);
    let reference = match &args.file {
        Some(path) => SourceReference::Content(path.clone()),
        None => SourceReference::Asset(config.default_asset.clone()),
    };
    let source = resolver.resolve(&reference);

    let mut viewer = ViewerState::new(PdfDecoder::new(), &config);
    viewer.open(source)?;
    wait(&mut viewer, timeout)?;

    if viewer.state().is_password_required() {
        let Some(password) = args.password.as_deref() else {
            bail!("{}", viewer.snapshot().status_message());
        };
        viewer.submit_password(password)?;
        wait(&mut viewer, timeout)?;
    }

    let page_count = match viewer.state() {
        SessionState::Ready { page_count } => *page_count,
        _ => bail!("{}", viewer.snapshot().status_message()),
    };
    if page_count == 0 {
        println!("{}", viewer.snapshot().status_message());
        return Ok(());
    }

    fs::create_dir_all(&args.out)
        .with_context(|| format!("Failed to create output directory {:?}", args.out))?;
    // 缓存副本的文件名是 hash，输出文件用原始文件名
    let stem = args
        .file
        .as_deref()
        .unwrap_or_else(|| Path::new(&config.default_asset))
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "page".to_string());

    let pages: Vec<usize> = if args.all {
        (0..page_count).collect()
    } else {
        vec![args.page.max(1) - 1]
    };

    for index in pages {
        viewer.go_to_page(index)?;
        // 换页会重置缩放
        viewer.zoom_by(args.zoom);
        wait(&mut viewer, timeout)?;

        let snapshot = viewer.snapshot();
        let label = snapshot.page_label();
        if let Some(e) = snapshot.last_render_error {
            bail!("Failed to render page {}: {}", index + 1, e);
        }
        let Some(page) = snapshot.page else {
            bail!("No image for page {}", index + 1);
        };

        let path = args.out.join(format!("{}-{}.png", stem, index + 1));
        page.image
            .save(&path)
            .with_context(|| format!("Failed to save {:?}", path))?;
        info!(
            "{} ({}x{}, zoom {:.2}) -> {:?}",
            label,
            page.width(),
            page.height(),
            viewer.transform().scale(),
            path
        );
        println!("{}", path.display());
    }

    viewer.dispose();
    Ok(())
}

fn wait(viewer: &mut ViewerState, timeout: Duration) -> Result<()> {
    if !viewer.wait_idle(timeout) {
        bail!("Timed out after {:?} waiting for the decoder", timeout);
    }
    Ok(())
}
