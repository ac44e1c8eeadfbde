//! Genome decoding: fixed-length real vectors to named configurations.

use crate::schema::{Config, GenomeSpec};

/// Decodes genomes against a parameter spec. Stateless; no encode
/// operation exists.
pub struct GenomeCodec;

impl GenomeCodec {
    /// Decode a genome into a configuration.
    ///
    /// For each parameter `i` in spec order the gene (0.0 when the genome
    /// is shorter than the spec) is squashed through tanh into (-1, 1),
    /// shifted to (0, 1), and mapped linearly onto the parameter range.
    /// An all-zero genome decodes to the exact midpoint of every range.
    pub fn decode(genome: &[f64], spec: &GenomeSpec) -> Config {
        spec.params()
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let gene = genome.get(i).copied().unwrap_or(0.0);
                let n = (gene.tanh() + 1.0) / 2.0;
                // Lerp form keeps the n = 0.5 case bit-exact.
                let value = p.min * (1.0 - n) + p.max * n;
                (p.name.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParamSpec;
    use proptest::prelude::*;

    fn spec_of(ranges: &[(&str, f64, f64)]) -> GenomeSpec {
        GenomeSpec::new(
            ranges
                .iter()
                .map(|(name, min, max)| ParamSpec {
                    name: (*name).to_string(),
                    min: *min,
                    max: *max,
                    step: 0.0,
                })
                .collect(),
        )
    }

    #[test]
    fn test_zero_genome_decodes_to_midpoints() {
        let spec = spec_of(&[("x", 0.0, 10.0), ("y", -4.0, 4.0), ("z", 1.0, 3.0)]);
        let config = GenomeCodec::decode(&[0.0, 0.0, 0.0], &spec);
        assert_eq!(config["x"], 5.0);
        assert_eq!(config["y"], 0.0);
        assert_eq!(config["z"], 2.0);
    }

    #[test]
    fn test_short_genome_zero_pads() {
        let spec = spec_of(&[("a", 0.0, 1.0), ("b", 0.0, 1.0), ("c", 0.0, 1.0)]);
        let short = GenomeCodec::decode(&[0.7], &spec);
        let full = GenomeCodec::decode(&[0.7, 0.0, 0.0], &spec);
        assert_eq!(short, full);
    }

    #[test]
    fn test_saturated_gene_approaches_max() {
        let spec = spec_of(&[("x", 0.0, 10.0)]);
        let config = GenomeCodec::decode(&[10.0], &spec);
        assert!((config["x"] - 10.0).abs() < 1e-6);
        let config = GenomeCodec::decode(&[-10.0], &spec);
        assert!(config["x"].abs() < 1e-6);
    }

    #[test]
    fn test_empty_spec_yields_empty_config() {
        let spec = GenomeSpec::default();
        assert!(GenomeCodec::decode(&[1.0, 2.0], &spec).is_empty());
    }

    proptest! {
        #[test]
        fn prop_zero_genome_is_exact_midpoint(
            min in -1e6f64..1e6,
            span in 0.0f64..1e6,
        ) {
            let max = min + span;
            let spec = spec_of(&[("p", min, max)]);
            let config = GenomeCodec::decode(&[0.0], &spec);
            prop_assert_eq!(config["p"], (min + max) / 2.0);
        }

        #[test]
        fn prop_decoded_values_stay_in_range(
            gene in -50.0f64..50.0,
            min in -1e3f64..1e3,
            span in 0.0f64..1e3,
        ) {
            let max = min + span;
            let spec = spec_of(&[("p", min, max)]);
            let config = GenomeCodec::decode(&[gene], &spec);
            prop_assert!(config["p"] >= min && config["p"] <= max);
        }

        #[test]
        fn prop_short_equals_zero_padded(genes in proptest::collection::vec(-5.0f64..5.0, 0..4)) {
            let spec = spec_of(&[("a", 0.0, 1.0), ("b", -2.0, 2.0),
                                 ("c", 5.0, 9.0), ("d", -1.0, 0.0)]);
            let mut padded = genes.clone();
            padded.resize(4, 0.0);
            prop_assert_eq!(
                GenomeCodec::decode(&genes, &spec),
                GenomeCodec::decode(&padded, &spec)
            );
        }
    }
}
