//! Solver Generation Demo
//!
//! Builds the navigation MPC problem and writes its manifest:
//!
//! ```text
//! cargo run -p navi-planner --example generate_solver -- [config.toml] [--tcp]
//! ```
//!
//! Afterwards a parameter vector is packed for a small scene and the compiled
//! problem is evaluated at a constant-velocity guess.

use nalgebra::{Vector2, Vector3};
use tracing_subscriber::EnvFilter;

use navi_core::geometry::ConvexPolygon;
use navi_core::{Ellipse, UnicycleModel};
use navi_planner::config::MpcConfig;
use navi_planner::{InterfaceMode, ManifestBackend, MpcBuilder, ParameterPack, Problem, Weights};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let interface = if args.iter().any(|a| a == "--tcp") {
        InterfaceMode::tcp()
    } else {
        InterfaceMode::Bindings
    };
    let config = match args.iter().find(|a| !a.starts_with("--")) {
        Some(path) => MpcConfig::from_toml_file(path)?,
        None => MpcConfig::default(),
    };

    println!("=== Navi MPC Solver Generation ===\n");
    println!("Horizon: {} steps × {} s", config.horizon.n_hor, config.horizon.ts);
    println!(
        "Environment: {} robots, {} static, {} dynamic obstacles",
        config.environment.n_other, config.environment.n_stc_obs, config.environment.n_dyn_obs
    );

    let model = UnicycleModel::default();
    let artifact = MpcBuilder::new(config.clone())?.build(&model, interface, &ManifestBackend)?;
    println!("Manifest: {}", artifact.manifest.display());
    println!("Decision variables: {}", artifact.n_decision);
    println!("Parameters: {}\n", artifact.n_parameter);

    // === Sample evaluation ===
    let problem = Problem::new(&config, &model)?;
    let n_hor = config.horizon.n_hor;

    let mut pack = ParameterPack::new(problem.layout());
    pack.set_state(&Vector3::new(0.0, 0.0, 0.0))
        .set_goal(&Vector3::new(5.0, 0.0, 0.0))
        .set_initial_control(&Vector2::new(0.0, 0.0))
        .set_weights(&Weights::default());
    pack.set_reference(&[Vector3::new(0.0, 0.0, 0.0), Vector3::new(5.0, 0.0, 0.0)], &[1.0])?;
    pack.add_static_obstacle(&ConvexPolygon::rectangle(2.0, 0.5, 3.0, 1.5)?)?;
    let crossing: Vec<Ellipse<f64>> = (0..n_hor)
        .map(|k| Ellipse {
            cx: 3.0,
            cy: -2.0 + 0.8 * config.horizon.ts * k as f64,
            rx: 0.4,
            ry: 0.3,
            angle: 0.0,
            alpha: 1.0,
        })
        .collect();
    pack.add_dynamic_obstacle(&crossing)?;
    pack.set_static_weights(&vec![1.0; n_hor])?;
    pack.set_dynamic_weights(&vec![1.0; n_hor])?;
    let p = pack.finish();

    let u: Vec<f64> = std::iter::repeat([0.2, 0.0]).take(n_hor).flatten().collect();
    let eval = problem.evaluate(&u, &p)?;
    let (_, gradient) = problem.cost_gradient(&u, &p)?;

    println!("Cost at guess: {:.4}", eval.cost);
    println!("Max obstacle penalty: {:.4e}", eval.max_penalty);
    println!("Controls within bounds: {}", eval.controls_feasible);
    println!("Accelerations within bounds: {}", eval.accelerations_feasible);
    println!("‖∇cost‖: {:.4}", gradient.iter().map(|g| g * g).sum::<f64>().sqrt());

    Ok(())
}
