use std::any::TypeId;
use std::cell::RefMut;

use log::trace;

use crate::context::Context;
use crate::hashing::hash_str;
use crate::rand::distr::uniform::{SampleRange, SampleUniform};
use crate::rand::distr::weighted::{Weight, WeightedIndex};
use crate::rand::distr::Distribution;
use crate::rand::seq::SliceRandom;
use crate::rand::{Rng, SeedableRng};
use crate::random::{RngHolder, RngId, RngPlugin};

/// Gets a mutable reference to the random number generator associated with the given
/// [`RngId`]. If the Rng has not been used before, one will be created with the base seed
/// you defined in `init_random`. Note that this will panic if `init_random` was not called yet.
fn get_rng<R: RngId + 'static>(context: &Context) -> RefMut<R::RngType> {
    let data_container = context
        .get_data_container(RngPlugin)
        .expect("You must initialize the random number generator with a base seed");
    let base_seed = data_container
        .base_seed
        .expect("You must initialize the random number generator with a base seed");

    let rng_holders = data_container.rng_holders.borrow_mut();
    RefMut::map(rng_holders, |holders| {
        holders
            .entry(TypeId::of::<R>())
            .or_insert_with(|| {
                trace!("creating new RNG {} (seed={})", R::get_name(), base_seed);
                let seed_offset = hash_str(R::get_name());
                RngHolder {
                    rng: Box::new(R::RngType::seed_from_u64(
                        base_seed.wrapping_add(seed_offset),
                    )),
                }
            })
            .rng
            .downcast_mut::<R::RngType>()
            .expect("rng holder has the wrong type")
    })
}

/// Random number generation on `Context`. Each [`RngId`] names an
/// independent stream, so adding draws to one module does not perturb the
/// sequence seen by another.
pub trait ContextRandomExt {
    /// Sets the base seed and drops any generators created so far so they are
    /// re-seeded on next use.
    fn init_random(&mut self, base_seed: u64);

    /// Gets a random sample from the generator associated with the given
    /// [`RngId`] by applying the specified sampler function.
    fn sample<R: RngId + 'static, T>(
        &self,
        rng_type: R,
        sampler: impl FnOnce(&mut R::RngType) -> T,
    ) -> T;

    /// Gets a random sample from the specified distribution.
    fn sample_distr<R: RngId + 'static, T>(&self, rng_type: R, distribution: impl Distribution<T>) -> T
    where
        R::RngType: Rng;

    /// Gets a random sample within the range provided by `range`.
    fn sample_range<R: RngId + 'static, S, T>(&self, rng_id: R, range: S) -> T
    where
        R::RngType: Rng,
        S: SampleRange<T>,
        T: SampleUniform;

    /// Gets a random boolean value which is true with probability `p`.
    /// Probabilities outside `[0, 1]` are clamped.
    fn sample_bool<R: RngId + 'static>(&self, rng_id: R, p: f64) -> bool
    where
        R::RngType: Rng;

    /// Draws an index into `weights` with probability proportional to its weight.
    ///
    /// # Panics
    ///
    /// Panics if the weights are empty, negative or sum to zero.
    fn sample_weighted<R: RngId + 'static, T>(&self, rng_id: R, weights: &[T]) -> usize
    where
        R::RngType: Rng,
        T: Clone + Default + SampleUniform + for<'a> std::ops::AddAssign<&'a T> + PartialOrd + Weight;

    /// Shuffles `values` in place.
    fn shuffle<R: RngId + 'static, T>(&self, rng_id: R, values: &mut [T])
    where
        R::RngType: Rng;
}

impl ContextRandomExt for Context {
    fn init_random(&mut self, base_seed: u64) {
        trace!("initializing random module");
        let data_container = self.get_data_container_mut(RngPlugin);
        data_container.base_seed = Some(base_seed);
        data_container.rng_holders.borrow_mut().clear();
    }

    fn sample<R: RngId + 'static, T>(
        &self,
        _rng_type: R,
        sampler: impl FnOnce(&mut R::RngType) -> T,
    ) -> T {
        let mut rng = get_rng::<R>(self);
        sampler(&mut rng)
    }

    fn sample_distr<R: RngId + 'static, T>(&self, _rng_type: R, distribution: impl Distribution<T>) -> T
    where
        R::RngType: Rng,
    {
        let mut rng = get_rng::<R>(self);
        distribution.sample::<R::RngType>(&mut rng)
    }

    fn sample_range<R: RngId + 'static, S, T>(&self, rng_id: R, range: S) -> T
    where
        R::RngType: Rng,
        S: SampleRange<T>,
        T: SampleUniform,
    {
        self.sample(rng_id, |rng| rng.random_range(range))
    }

    fn sample_bool<R: RngId + 'static>(&self, rng_id: R, p: f64) -> bool
    where
        R::RngType: Rng,
    {
        self.sample(rng_id, |rng| rng.random_bool(p.clamp(0.0, 1.0)))
    }

    fn sample_weighted<R: RngId + 'static, T>(&self, _rng_id: R, weights: &[T]) -> usize
    where
        R::RngType: Rng,
        T: Clone + Default + SampleUniform + for<'a> std::ops::AddAssign<&'a T> + PartialOrd + Weight,
    {
        let index = WeightedIndex::new(weights).expect("invalid sampling weights");
        let mut rng = get_rng::<R>(self);
        index.sample(&mut *rng)
    }

    fn shuffle<R: RngId + 'static, T>(&self, _rng_id: R, values: &mut [T])
    where
        R::RngType: Rng,
    {
        let mut rng = get_rng::<R>(self);
        values.shuffle(&mut *rng);
    }
}

#[cfg(test)]
mod test {
    use crate::context::Context;
    use crate::define_rng;
    use crate::rand::RngCore;
    use crate::random::context_ext::ContextRandomExt;
    use rand_distr::Normal;

    define_rng!(FooRng);
    define_rng!(BarRng);

    #[test]
    #[should_panic(expected = "You must initialize the random number generator with a base seed")]
    fn sampling_without_seed_panics() {
        let context = Context::new();
        context.sample_range(FooRng, 0..10);
    }

    #[test]
    fn get_rng_basic() {
        let mut context = Context::new();
        context.init_random(42);

        assert_ne!(
            context.sample(FooRng, RngCore::next_u64),
            context.sample(FooRng, RngCore::next_u64)
        );
    }

    #[test]
    fn multiple_rng_types() {
        let mut context = Context::new();
        context.init_random(42);

        assert_ne!(
            context.sample(FooRng, RngCore::next_u64),
            context.sample(BarRng, RngCore::next_u64)
        );
    }

    #[test]
    fn reset_seed() {
        let mut context = Context::new();
        context.init_random(42);

        let run_0 = context.sample(FooRng, RngCore::next_u64);
        let run_1 = context.sample(FooRng, RngCore::next_u64);

        context.init_random(42);
        assert_eq!(run_0, context.sample(FooRng, RngCore::next_u64));
        assert_eq!(run_1, context.sample(FooRng, RngCore::next_u64));

        context.init_random(88);
        assert_ne!(run_0, context.sample(FooRng, RngCore::next_u64));
        assert_ne!(run_1, context.sample(FooRng, RngCore::next_u64));
    }

    #[test]
    fn sample_distribution() {
        let mut context = Context::new();
        context.init_random(42);
        let normal = Normal::new(5.0, 1.0).unwrap();
        let n_samples = 2000;
        let total: f64 = (0..n_samples)
            .map(|_| context.sample_distr(FooRng, normal))
            .sum();
        let mean = total / f64::from(n_samples);
        assert!((mean - 5.0).abs() < 0.1);
    }

    #[test]
    fn sample_bool_extremes() {
        let mut context = Context::new();
        context.init_random(42);
        assert!(context.sample_bool(FooRng, 1.0));
        assert!(!context.sample_bool(FooRng, 0.0));
        assert!(context.sample_bool(FooRng, 1.5));
    }

    #[test]
    fn sample_weighted() {
        let mut context = Context::new();
        context.init_random(42);
        let r: usize = context.sample_weighted(FooRng, &[0.1, 0.3, 0.4]);
        assert!(r < 3);
        assert_eq!(context.sample_weighted(FooRng, &[0.0, 1.0, 0.0]), 1);
    }

    #[test]
    fn shuffle_keeps_elements() {
        let mut context = Context::new();
        context.init_random(42);
        let mut values: Vec<u32> = (0..50).collect();
        context.shuffle(FooRng, &mut values);
        let mut sorted = values.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<u32>>());
    }
}
