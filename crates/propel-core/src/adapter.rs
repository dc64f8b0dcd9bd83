//! Per-type numeric operations and the registry that holds them.
//!
//! A type becomes drivable by registering an [`Adapter`] for it; driving a
//! value along a path additionally needs a [`CoordinateAdapter`] so the
//! engine can decompose the value into scalar dimensions and rebuild it
//! from a sampled path point. Numeric semantics are caller-supplied: the
//! registry stores the operations, it does not validate them.

use crate::math::VecN;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// The five core operations that make a type drivable.
///
/// `lerp(a, b, t) = a + (b - a) * t` is the conventional contract but is not
/// enforced; `inverse_lerp` is expected to invert `lerp` for `t` in `[0,1]`
/// for well-behaved adapters (a testable property, not a guarantee the
/// registry checks).
pub struct Adapter<T> {
    pub zero: Arc<dyn Fn() -> T>,
    pub add: Arc<dyn Fn(&T, &T) -> T>,
    /// Distance between two values; `distance(zero(), v)` is the length of `v`.
    pub distance: Arc<dyn Fn(&T, &T) -> f64>,
    pub lerp: Arc<dyn Fn(&T, &T, f64) -> T>,
    pub inverse_lerp: Arc<dyn Fn(&T, &T, &T) -> f64>,
}

impl<T> Clone for Adapter<T> {
    fn clone(&self) -> Self {
        Self {
            zero: Arc::clone(&self.zero),
            add: Arc::clone(&self.add),
            distance: Arc::clone(&self.distance),
            lerp: Arc::clone(&self.lerp),
            inverse_lerp: Arc::clone(&self.inverse_lerp),
        }
    }
}

/// Decomposition of a value into scalar dimensions and reconstruction from
/// them. Required only when a driver moves a value along a path.
pub struct CoordinateAdapter<T> {
    dimensions: usize,
    construct: Arc<dyn Fn(&[f64]) -> T>,
    getters: Vec<Arc<dyn Fn(&T) -> f64>>,
}

impl<T> Clone for CoordinateAdapter<T> {
    fn clone(&self) -> Self {
        Self {
            dimensions: self.dimensions,
            construct: Arc::clone(&self.construct),
            getters: self.getters.clone(),
        }
    }
}

impl<T> CoordinateAdapter<T> {
    /// Build a coordinate adapter from a constructor and one getter per
    /// dimension. Panics if `getters` is empty.
    pub fn new(
        construct: impl Fn(&[f64]) -> T + 'static,
        getters: Vec<Arc<dyn Fn(&T) -> f64>>,
    ) -> Self {
        assert!(!getters.is_empty(), "coordinate adapter needs dimensions");
        Self {
            dimensions: getters.len(),
            construct: Arc::new(construct),
            getters,
        }
    }

    /// Number of scalar dimensions.
    #[inline]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Decompose a value into a path point.
    pub fn to_point(&self, value: &T) -> VecN {
        VecN::new(self.getters.iter().map(|g| g(value)).collect::<Vec<_>>())
    }

    /// Rebuild a value from a path point.
    pub fn from_point(&self, point: &VecN) -> T {
        (self.construct)(point.components())
    }
}

/// Table mapping a value type to its numeric operations.
///
/// Lookups are resolved once at driver construction and the resulting
/// `Arc<Adapter<T>>` stored on the driver instance.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<TypeId, Box<dyn Any>>,
    coordinates: HashMap<TypeId, Box<dyn Any>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the core operations for `T`, replacing any previous
    /// registration.
    pub fn register<T: 'static>(
        &mut self,
        zero: impl Fn() -> T + 'static,
        add: impl Fn(&T, &T) -> T + 'static,
        distance: impl Fn(&T, &T) -> f64 + 'static,
        lerp: impl Fn(&T, &T, f64) -> T + 'static,
        inverse_lerp: impl Fn(&T, &T, &T) -> f64 + 'static,
    ) {
        let adapter = Adapter {
            zero: Arc::new(zero),
            add: Arc::new(add),
            distance: Arc::new(distance),
            lerp: Arc::new(lerp),
            inverse_lerp: Arc::new(inverse_lerp),
        };
        self.adapters
            .insert(TypeId::of::<T>(), Box::new(Arc::new(adapter)));
    }

    /// Install dimension decomposition for `T`, replacing any previous
    /// registration.
    pub fn register_coordinate<T: 'static>(&mut self, coordinate: CoordinateAdapter<T>) {
        self.coordinates
            .insert(TypeId::of::<T>(), Box::new(Arc::new(coordinate)));
    }

    /// Look up the operations for `T`.
    pub fn get<T: 'static>(&self) -> Option<Arc<Adapter<T>>> {
        self.adapters
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<Arc<Adapter<T>>>())
            .map(Arc::clone)
    }

    /// Look up the coordinate decomposition for `T`.
    pub fn get_coordinate<T: 'static>(&self) -> Option<Arc<CoordinateAdapter<T>>> {
        self.coordinates
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<Arc<CoordinateAdapter<T>>>())
            .map(Arc::clone)
    }

    /// Whether `T` is drivable.
    #[inline]
    pub fn is_registered<T: 'static>(&self) -> bool {
        self.adapters.contains_key(&TypeId::of::<T>())
    }

    /// Install adapters for `f64`, `f32` and [`VecN`] so the engine is usable
    /// out of the box. The `VecN` zero is the empty vector; `add` treats an
    /// empty operand as the identity so accumulators can be seeded without
    /// knowing the dimension count up front.
    pub fn register_primitives(&mut self) {
        self.register::<f64>(
            || 0.0,
            |a, b| a + b,
            |a, b| (b - a).abs(),
            |a, b, t| a + (b - a) * t,
            |a, b, v| if (b - a).abs() > f64::EPSILON { (v - a) / (b - a) } else { 0.0 },
        );
        self.register_coordinate::<f64>(CoordinateAdapter::new(
            |c| c[0],
            vec![Arc::new(|v: &f64| *v)],
        ));

        self.register::<f32>(
            || 0.0,
            |a, b| a + b,
            |a, b| f64::from((b - a).abs()),
            |a, b, t| a + (b - a) * t as f32,
            |a, b, v| {
                if (b - a).abs() > f32::EPSILON {
                    f64::from((v - a) / (b - a))
                } else {
                    0.0
                }
            },
        );
        self.register_coordinate::<f32>(CoordinateAdapter::new(
            |c| c[0] as f32,
            vec![Arc::new(|v: &f32| f64::from(*v))],
        ));

        self.register::<VecN>(
            VecN::default,
            |a, b| {
                if a.dimensions() == 0 {
                    b.clone()
                } else if b.dimensions() == 0 {
                    a.clone()
                } else {
                    a.add(b)
                }
            },
            |a, b| {
                if a.dimensions() == 0 {
                    b.magnitude()
                } else {
                    a.distance(b)
                }
            },
            |a, b, t| {
                if a.dimensions() == 0 {
                    b.scale(t)
                } else {
                    a.lerp(b, t)
                }
            },
            |a, b, v| a.inverse_lerp(b, v),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lookup_after_registration() {
        let mut registry = AdapterRegistry::new();
        assert!(!registry.is_registered::<f64>());
        registry.register_primitives();
        assert!(registry.is_registered::<f64>());
        assert!(registry.is_registered::<VecN>());
        assert!(registry.get::<String>().is_none());
    }

    #[test]
    fn resolved_adapter_operates() {
        let mut registry = AdapterRegistry::new();
        registry.register_primitives();
        let ops = registry.get::<f64>().unwrap();
        assert_relative_eq!((ops.lerp)(&2.0, &6.0, 0.25), 3.0);
        assert_relative_eq!((ops.distance)(&2.0, &6.0), 4.0);
    }

    #[test]
    fn coordinate_round_trip() {
        let mut registry = AdapterRegistry::new();
        registry.register_primitives();
        let coord = registry.get_coordinate::<f64>().unwrap();
        let point = coord.to_point(&4.5);
        assert_eq!(point.dimensions(), 1);
        assert_relative_eq!(coord.from_point(&point), 4.5);
    }

    #[test]
    fn vecn_add_treats_empty_as_zero() {
        let mut registry = AdapterRegistry::new();
        registry.register_primitives();
        let ops = registry.get::<VecN>().unwrap();
        let zero = (ops.zero)();
        let v = VecN::new(vec![1.0, 2.0]);
        assert_eq!((ops.add)(&zero, &v), v);
        assert_eq!((ops.add)(&v, &zero), v);
    }
}
