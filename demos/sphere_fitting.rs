//! Example: Sphere fitting with every robust method
//!
//! Samples points on a sphere, adds a little noise to the inliers and moves
//! a fraction of them far away, then fits the sphere with RANSAC, LMedS,
//! MSAC, PROSAC and PROMedS and prints what each one found.

use nalgebra::{Point3, Vector3};
use rand::Rng;
use robust_fit::estimators::SphereEstimator;
use robust_fit::*;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("=== Sphere Fitting Example ===\n");

    let truth = Sphere::new(Point3::new(1.5, -0.5, 4.0), 8.0);
    let n_points = 800;
    let outlier_ratio = 0.25;

    let mut rng = rand::thread_rng();
    let mut points = Vec::with_capacity(n_points);
    let mut scores = Vec::with_capacity(n_points);
    for _ in 0..n_points {
        let dir = loop {
            let v = Vector3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            if v.norm() > 0.1 && v.norm() <= 1.0 {
                break v.normalize();
            }
        };
        if rng.gen_bool(outlier_ratio) {
            points.push(truth.center + dir * (truth.radius + rng.gen_range(3.0..15.0)));
            scores.push(rng.gen_range(0.0..0.6));
        } else {
            points.push(truth.center + dir * (truth.radius + rng.gen_range(-0.02..0.02)));
            scores.push(rng.gen_range(0.4..1.0));
        }
    }

    println!(
        "Ground truth: center ({:.3}, {:.3}, {:.3}), radius {:.3}\n",
        truth.center.x, truth.center.y, truth.center.z, truth.radius
    );

    for method in RobustMethod::ALL {
        let settings = RobustEstimatorSettings {
            keep_covariance: true,
            threshold: if method.is_median_based() { 0.05 } else { 0.1 },
            ..RobustEstimatorSettings::for_method(method)
        };
        let result = fit_sphere(&points, Some(&scores), method, Some(settings))?;
        let m = &result.model;
        println!("{method}:");
        println!(
            "  center ({:.4}, {:.4}, {:.4}), radius {:.4}",
            m.center.x, m.center.y, m.center.z, m.radius
        );
        println!(
            "  {} inliers out of {}, {} iterations",
            result.inliers.num_inliers(),
            n_points,
            result.iterations
        );
        if let Some(cov) = &result.covariance {
            println!("  radius std-dev {:.2e}", cov[(3, 3)].sqrt());
        }
    }

    // The stateful estimator reports its progress through a listener.
    println!("\nPROSAC with progress reporting:");
    let mut estimator =
        RobustEstimator::with_observations(SphereEstimator::new(), RobustMethod::Prosac, points)?
            .with_quality_scores(scores)?
            .with_listener(
                |_: &mut RobustEstimator<SphereEstimator>, event: EstimatorEvent| {
                    if let EstimatorEvent::ProgressChanged(p) = event {
                        println!("  progress {:.0}%", p * 100.0);
                    }
                },
            );
    estimator.set_threshold(0.1)?;
    let sphere = estimator.estimate()?;
    println!(
        "  radius {:.4} after {} iterations",
        sphere.radius,
        estimator.num_iterations()
    );

    Ok(())
}
