use rand::{
    prelude::Distribution,
    Rng,
    SeedableRng,
    rngs::StdRng,
};

use crate::gaussian::{
    Splat,
    SplatCloud,
};


impl Distribution<Splat> for rand::distributions::Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Splat {
        let rotation: [f32; 4] = [
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        ];
        let norm = rotation
            .iter()
            .map(|v| v * v)
            .sum::<f32>()
            .sqrt()
            .max(f32::EPSILON);

        Splat {
            position: [
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-2.0..2.0),
            ],
            scale: [
                rng.gen_range(0.01..0.1),
                rng.gen_range(0.01..0.1),
                rng.gen_range(0.01..0.1),
            ],
            rotation: rotation.map(|v| v / norm),
            opacity: rng.gen_range(0.2..1.0),
            color: [
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..1.0),
            ],
        }
    }
}

/// reproducible cloud for tests and benches
pub fn seeded_splats(n: usize, seed: u64) -> SplatCloud {
    random_splats_with(&mut StdRng::seed_from_u64(seed), n)
}

fn random_splats_with<R: Rng>(rng: &mut R, n: usize) -> SplatCloud {
    let splats: Vec<Splat> = (0..n).map(|_| rng.r#gen()).collect();

    SplatCloud::from_splats(splats)
}
