use argh::FromArgs;
use std::path::PathBuf;

use rephoto::imgproc::interpolation::InterpolationMode;
use rephoto::{CompositeMode, Project, TransformKind};

fn parse_method(value: &str) -> Result<TransformKind, String> {
    match value {
        "homography" => Ok(TransformKind::Homography),
        "tps" => Ok(TransformKind::ThinPlateSpline),
        _ => Err(format!("unknown method `{value}`, expected homography or tps")),
    }
}

fn parse_interpolation(value: &str) -> Result<InterpolationMode, String> {
    match value {
        "bilinear" => Ok(InterpolationMode::Bilinear),
        "nearest" => Ok(InterpolationMode::Nearest),
        "bicubic" => Ok(InterpolationMode::Bicubic),
        _ => Err(format!(
            "unknown interpolation `{value}`, expected bilinear, nearest or bicubic"
        )),
    }
}

#[derive(FromArgs)]
/// Warp the modern image of a project onto its historical image and save the composite
struct Args {
    /// path to the project file
    #[argh(option, short = 'p')]
    project_path: PathBuf,

    /// path of the output image
    #[argh(option, short = 'o')]
    output_path: PathBuf,

    /// transform family, homography or tps; defaults to the project setting
    #[argh(option, from_str_fn(parse_method))]
    method: Option<TransformKind>,

    /// composite mode: slider, ghost, diff or warped
    #[argh(option, default = "String::from(\"slider\")")]
    mode: String,

    /// slider position or ghost opacity in [0, 1]
    #[argh(option, default = "0.5")]
    position: f32,

    /// fit the homography robustly, dropping pairs farther than this many pixels
    #[argh(option)]
    ransac: Option<f64>,

    /// resampling, bilinear, nearest or bicubic
    #[argh(option, default = "InterpolationMode::Bilinear", from_str_fn(parse_interpolation))]
    interpolation: InterpolationMode,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let project = Project::load(&args.project_path)?;
    let base_dir = args
        .project_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_default();

    let (Some(path_a), Some(path_b)) = project.resolved_image_paths(&base_dir) else {
        return Err("the project does not name both images".into());
    };
    let image_a = rephoto::io::functional::read_image_rgba32f(&path_a)?;
    let image_b = rephoto::io::functional::read_image_rgba32f(&path_b)?;
    println!("Historical image: {}", image_a.size());
    println!("Modern image: {}", image_b.size());

    let mut solver = rephoto::geometry::SolverConfig::default();
    solver.tps_smoothing = project.tps_smoothing;
    solver.homography_ransac = args.ransac.map(|threshold| rephoto::geometry::RansacConfig {
        threshold,
        ..Default::default()
    });
    let kind = args.method.unwrap_or(project.warp_method);

    let pairs = project.store.flatten_to_point_pairs();
    println!("Solving a {kind} from {} point pairs", pairs.len());
    let transform = rephoto::compute_transform(&pairs, kind, &solver)?;
    log::info!("max residual: {:.3e}", transform.max_residual(&pairs));

    let warped = rephoto::warp(&image_b, &transform, image_a.size(), args.interpolation)?;

    let output = match args.mode.as_str() {
        "warped" => warped,
        "slider" => rephoto::composite(&image_a, &warped, CompositeMode::slider(args.position))?,
        "ghost" => rephoto::composite(
            &image_a,
            &warped,
            CompositeMode::Ghost {
                alpha: args.position,
            }
            .clamped(),
        )?,
        "diff" => rephoto::composite(&image_a, &warped, CompositeMode::diff())?,
        other => return Err(format!("unknown composite mode `{other}`").into()),
    };

    rephoto::export_image(&output, &args.output_path)?;
    println!("Saved {}", args.output_path.display());

    Ok(())
}
