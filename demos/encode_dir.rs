use capture_encoder::{
    EncoderSettings, FrameInfo, FrameSet, JobOrchestrator, Rect, StatusEvent,
};
use image::{Rgba, RgbaImage};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

fn main() -> capture_encoder::Result<()> {
    tracing_subscriber::fmt::init();

    // Encode the PNGs of the given directory, or render some frames
    let frames_dir = match env::args().nth(1) {
        Some(dir) => PathBuf::from(dir),
        None => render_frames("captures/encode_dir/frames")?,
    };
    let output = env::args()
        .nth(2)
        .unwrap_or_else(|| "captures/encode_dir/out.gif".to_string());

    let frames = load_frame_set(&frames_dir)?;
    println!("Encoding {} frames into {output}", frames.len());

    // Print every status change
    let (tx, rx) = crossbeam_channel::unbounded::<StatusEvent>();
    let orchestrator =
        JobOrchestrator::new(tx)?.with_settings(EncoderSettings::default().loop_forever());

    let gif = orchestrator.submit(frames.clone(), &output)?;
    let avi = orchestrator.submit(frames, PathBuf::from(&output).with_extension("avi"))?;

    let mut pending = 2;
    for event in rx {
        println!(
            "[{}] {:<10} {:>4} {}",
            &event.job_id.to_string()[..8],
            event.status,
            event.current_frame,
            event.text
        );
        if (event.job_id == gif || event.job_id == avi) && event.status.is_terminal() {
            pending -= 1;
            if pending == 0 {
                break;
            }
        }
    }

    for job in orchestrator.jobs() {
        println!("{} -> {:?}", job.output_path.display(), job.result());
    }

    Ok(())
}

fn load_frame_set(dir: &Path) -> capture_encoder::Result<FrameSet> {
    let mut paths = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "png"))
        .collect::<Vec<_>>();
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        let (width, height) = image::image_dimensions(&path)?;
        frames.push(FrameInfo::new(path, Rect::new(0, 0, width, height), 5));
    }
    Ok(FrameSet::new(frames))
}

fn render_frames(dir: &str) -> capture_encoder::Result<PathBuf> {
    fs::create_dir_all(dir)?;

    // A blue square moving over a white background
    for i in 0..20u32 {
        let mut image = RgbaImage::from_pixel(128, 128, Rgba([255, 255, 255, 255]));
        for y in 48..80 {
            for x in 0..32 {
                image.put_pixel(x + i * 4, y, Rgba([0, 0, 255, 255]));
            }
        }
        image.save(PathBuf::from(dir).join(format!("{i:03}.png")))?;
    }

    Ok(PathBuf::from(dir))
}
