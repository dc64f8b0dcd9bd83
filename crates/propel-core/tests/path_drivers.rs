//! Driving user types along paths, and adapter contract properties.

use approx::assert_relative_eq;
use propel_core::{
    AdapterRegistry, BezierControl, BezierPath, CoordinateAdapter, CubicSplinePath, Drive, Engine,
    EngineConfig, Path, PathSample, TargetBinding, VecN,
};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Copy, Clone, Debug, Default, PartialEq)]
struct Point2 {
    x: f64,
    y: f64,
}

fn register_point2(registry: &mut AdapterRegistry) {
    registry.register::<Point2>(
        Point2::default,
        |a, b| Point2 {
            x: a.x + b.x,
            y: a.y + b.y,
        },
        |a, b| ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt(),
        |a, b, t| Point2 {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
        },
        |a, b, v| {
            let dx = b.x - a.x;
            let dy = b.y - a.y;
            if dx.abs() > f64::EPSILON {
                (v.x - a.x) / dx
            } else if dy.abs() > f64::EPSILON {
                (v.y - a.y) / dy
            } else {
                0.0
            }
        },
    );
    registry.register_coordinate::<Point2>(CoordinateAdapter::new(
        |c| Point2 { x: c[0], y: c[1] },
        vec![
            Arc::new(|p: &Point2| p.x),
            Arc::new(|p: &Point2| p.y),
        ],
    ));
}

#[test]
fn inverse_lerp_inverts_lerp_for_registered_types() {
    let mut registry = AdapterRegistry::new();
    registry.register_primitives();
    register_point2(&mut registry);

    let f64_ops = registry.get::<f64>().unwrap();
    let vec_ops = registry.get::<VecN>().unwrap();
    let p2_ops = registry.get::<Point2>().unwrap();

    let a = VecN::new(vec![1.0, -2.0]);
    let b = VecN::new(vec![4.0, 6.0]);
    let pa = Point2 { x: 1.0, y: 2.0 };
    let pb = Point2 { x: 5.0, y: -2.0 };

    for i in 0..=10 {
        let t = i as f64 / 10.0;
        let v = (f64_ops.lerp)(&-3.0, &9.0, t);
        assert_relative_eq!((f64_ops.inverse_lerp)(&-3.0, &9.0, &v), t, epsilon = 1e-12);

        let v = (vec_ops.lerp)(&a, &b, t);
        assert_relative_eq!((vec_ops.inverse_lerp)(&a, &b, &v), t, epsilon = 1e-12);

        let v = (p2_ops.lerp)(&pa, &pb, t);
        assert_relative_eq!((p2_ops.inverse_lerp)(&pa, &pb, &v), t, epsilon = 1e-12);
    }
}

#[test]
fn tween_follows_a_linear_path() {
    let mut engine = Engine::new();
    register_point2(engine.adapters_mut());

    let point = Rc::new(Cell::new(Point2::default()));
    let sink = Rc::clone(&point);
    let path = Path::new(vec![
        VecN::new(vec![0.0, 0.0]),
        VecN::new(vec![10.0, 0.0]),
        VecN::new(vec![10.0, 10.0]),
    ]);
    engine.start(Drive::tween_path(
        TargetBinding::detached(move |p| sink.set(p)),
        path,
        1.0,
    ));

    let t0 = Instant::now();
    engine.pump_at(t0);
    engine.pump_at(t0 + Duration::from_millis(250));
    // Half the path length is 10 of 20 units: halfway along the first leg.
    assert_relative_eq!(point.get().x, 5.0, epsilon = 1e-9);
    assert_relative_eq!(point.get().y, 0.0, epsilon = 1e-9);

    engine.pump_at(t0 + Duration::from_millis(750));
    assert_relative_eq!(point.get().x, 10.0, epsilon = 1e-9);
    assert_relative_eq!(point.get().y, 5.0, epsilon = 1e-9);

    engine.pump_at(t0 + Duration::from_secs(1));
    assert_relative_eq!(point.get().y, 10.0, epsilon = 1e-9);
}

#[test]
fn speed_driver_covers_path_distance_per_second() {
    let mut engine = Engine::new();
    register_point2(engine.adapters_mut());

    let point = Rc::new(Cell::new(Point2::default()));
    let sink = Rc::clone(&point);
    let path = Path::new(vec![VecN::new(vec![0.0, 0.0]), VecN::new(vec![8.0, 0.0])]);
    engine.start(Drive::speed_path(
        TargetBinding::detached(move |p| sink.set(p)),
        || 2.0,
        path,
    ));

    let t0 = Instant::now();
    engine.pump_at(t0);
    engine.pump_at(t0 + Duration::from_secs(1));
    assert_relative_eq!(point.get().x, 2.0, epsilon = 1e-9);
    engine.pump_at(t0 + Duration::from_secs(3));
    assert_relative_eq!(point.get().x, 6.0, epsilon = 1e-9);
}

#[test]
fn path_segment_lengths_sum_to_total() {
    let mut path = BezierPath::new(vec![
        VecN::new(vec![0.0, 0.0]),
        VecN::new(vec![4.0, 0.0]),
        VecN::new(vec![4.0, 4.0]),
    ]);
    path.set_control(
        0,
        BezierControl::new(VecN::zeros(2), VecN::new(vec![0.0, 2.0])),
    );
    assert!(path.is_built());
    let sum: f64 = path.segments().iter().map(|s| s.length).sum();
    assert_relative_eq!(sum, path.length(), epsilon = 1e-9);

    let first = path.points().first().unwrap().clone();
    let last = path.points().last().unwrap().clone();
    assert_eq!(path.value_at(0.0).unwrap(), first);
    assert_eq!(path.value_at(1.0).unwrap(), last);
}

#[test]
fn closed_spline_frames_wrap_to_their_start() {
    let triangle = vec![
        VecN::new(vec![0.0, 0.0]),
        VecN::new(vec![4.0, 0.0]),
        VecN::new(vec![2.0, 3.0]),
    ];

    let mut bezier = BezierPath::new(triangle.clone());
    bezier.set_closed(true);
    let first = bezier.points().first().unwrap().clone();
    let last = bezier.points().last().unwrap().clone();
    assert_relative_eq!(first.distance(&last), 0.0, epsilon = 1e-9);

    let mut cubic = CubicSplinePath::new(triangle);
    cubic.set_closed(true);
    let start = cubic.value_at(0.0).unwrap();
    let end = cubic.value_at(1.0).unwrap();
    assert_relative_eq!(start.distance(&end), 0.0, epsilon = 1e-9);
}

#[test]
fn natural_cubic_reproduces_waypoints() {
    let waypoints = vec![
        VecN::new(vec![0.0, 0.0]),
        VecN::new(vec![1.0, 2.0]),
        VecN::new(vec![3.0, 1.0]),
        VecN::new(vec![4.0, 3.0]),
    ];
    let path = CubicSplinePath::new(waypoints.clone());
    assert!(path.is_built());

    let intervals = (waypoints.len() - 1) as f64;
    for (i, waypoint) in waypoints.iter().enumerate() {
        let pct = i as f64 / intervals;
        let value = path.spline_value_at(pct).unwrap();
        assert_relative_eq!(value[0], waypoint[0], epsilon = 1e-9);
        assert_relative_eq!(value[1], waypoint[1], epsilon = 1e-9);
    }
}

#[test]
fn engine_built_splines_carry_the_configured_timeout() {
    let mut engine = Engine::with_config(EngineConfig {
        spline_build_timeout: Duration::from_millis(50),
        ..EngineConfig::default()
    });
    register_point2(engine.adapters_mut());

    let spline = engine.cubic_path(vec![
        VecN::new(vec![0.0, 0.0]),
        VecN::new(vec![2.0, 2.0]),
        VecN::new(vec![4.0, 0.0]),
    ]);
    assert!(spline.is_built());

    let point = Rc::new(Cell::new(Point2::default()));
    let sink = Rc::clone(&point);
    engine.start(Drive::tween_path(
        TargetBinding::detached(move |p| sink.set(p)),
        spline,
        1.0,
    ));
    let t0 = Instant::now();
    engine.pump_at(t0);
    engine.pump_at(t0 + Duration::from_secs(1));
    assert_relative_eq!(point.get().x, 4.0, epsilon = 1e-6);
    assert_relative_eq!(point.get().y, 0.0, epsilon = 1e-6);
}

#[test]
fn missing_coordinate_adapter_discards_the_driver() {
    let mut engine = Engine::new();
    // Point2 has no registration at all here.
    let path = Path::new(vec![VecN::new(vec![0.0, 0.0]), VecN::new(vec![1.0, 0.0])]);
    let id = engine.start(Drive::tween_path(
        TargetBinding::detached(|_: Point2| {}),
        path,
        1.0,
    ));
    let t0 = Instant::now();
    engine.pump_at(t0);
    engine.pump_at(t0 + Duration::from_millis(16));
    assert!(!engine.contains(id));
}
