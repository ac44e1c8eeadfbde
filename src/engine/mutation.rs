//! Seeded randomness and targeted genome mutations.
//!
//! Mutations are grouped into pools keyed by the caller's intent tag, so a
//! "safety" run perturbs genomes conservatively while a "performance" run
//! explores more aggressively. Every operator reports a no-op (`None`)
//! instead of returning an unchanged copy; callers retry with another
//! draw.

use rand::prelude::*;
use rand_distr::StandardNormal;

use crate::schema::MutationIntent;

/// Random number generator for all genetic operators. Seedable so runs
/// are reproducible; never backed by process-global state.
pub struct TunerRng {
    rng: StdRng,
}

impl TunerRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create with entropy from the OS.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Uniform value in [low, high).
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        self.rng.gen_range(low..high)
    }

    /// Uniform index below `len`.
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    /// Standard normal sample scaled by `sigma`.
    pub fn normal(&mut self, sigma: f64) -> f64 {
        let n: f64 = self.rng.sample(StandardNormal);
        n * sigma
    }

    /// Biased coin flip.
    pub fn coin(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Pick a random element from a slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }
}

/// A single genome mutation operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenomeMutation {
    /// Gaussian jitter on one random gene.
    JitterGene,
    /// Small Gaussian jitter on every gene.
    NudgeAll,
    /// Multiply every gene by a random factor.
    ScaleAll,
    /// Replace one gene with a fresh uniform draw.
    ReseedGene,
    /// Swap the values of two random genes.
    SwapGenes,
    /// Halve one gene, moving its decoded value toward the midpoint.
    PushToMidpoint,
    /// Clamp every gene into [-1, 1], discarding saturated extremes.
    DampExtremes,
}

impl GenomeMutation {
    /// Tag recorded on individuals produced by this mutation.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::JitterGene => "jitter_gene",
            Self::NudgeAll => "nudge_all",
            Self::ScaleAll => "scale_all",
            Self::ReseedGene => "reseed_gene",
            Self::SwapGenes => "swap_genes",
            Self::PushToMidpoint => "push_to_midpoint",
            Self::DampExtremes => "damp_extremes",
        }
    }

    /// Apply to a genome. Returns `None` when the result would be
    /// identical to the input.
    pub fn apply(&self, genome: &[f64], rng: &mut TunerRng) -> Option<Vec<f64>> {
        if genome.is_empty() {
            return None;
        }
        let mut out = genome.to_vec();
        match self {
            Self::JitterGene => {
                let i = rng.index(out.len());
                out[i] += rng.normal(0.5);
            }
            Self::NudgeAll => {
                for gene in &mut out {
                    *gene += rng.normal(0.15);
                }
            }
            Self::ScaleAll => {
                let factor = rng.uniform(0.5, 1.5);
                for gene in &mut out {
                    *gene *= factor;
                }
            }
            Self::ReseedGene => {
                let i = rng.index(out.len());
                out[i] = rng.uniform(-2.0, 2.0);
            }
            Self::SwapGenes => {
                if out.len() < 2 {
                    return None;
                }
                let i = rng.index(out.len());
                let j = rng.index(out.len());
                out.swap(i, j);
            }
            Self::PushToMidpoint => {
                let i = rng.index(out.len());
                out[i] /= 2.0;
            }
            Self::DampExtremes => {
                for gene in &mut out {
                    *gene = gene.clamp(-1.0, 1.0);
                }
            }
        }
        if out == genome {
            None
        } else {
            Some(out)
        }
    }
}

/// Category-specific mutation pool for an intent tag.
pub fn mutation_pool(intent: MutationIntent) -> &'static [GenomeMutation] {
    use GenomeMutation::*;
    match intent {
        MutationIntent::Performance => &[ScaleAll, JitterGene, NudgeAll, ReseedGene],
        MutationIntent::Correctness => &[JitterGene, PushToMidpoint, SwapGenes],
        MutationIntent::Safety => &[PushToMidpoint, DampExtremes, NudgeAll],
        MutationIntent::General => &[JitterGene, NudgeAll, ScaleAll, ReseedGene, SwapGenes],
    }
}

/// Apply one targeted mutation drawn from the intent's pool, retrying
/// no-op draws up to the pool size. Returns the mutated genome and the
/// applied tag, or `None` when the pool is exhausted.
pub fn targeted_mutation(
    genome: &[f64],
    intent: MutationIntent,
    rng: &mut TunerRng,
) -> Option<(Vec<f64>, String)> {
    let pool = mutation_pool(intent);
    for _ in 0..pool.len() {
        let op = rng.pick(pool)?;
        if let Some(mutated) = op.apply(genome, rng) {
            return Some((mutated, op.tag().to_string()));
        }
    }
    None
}
