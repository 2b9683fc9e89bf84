use std::error::Error;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use soap_dedup::app::run_dedup_app;
use soap_dedup::{
    AtomicStructure, DedupError, DedupRun, DescriptorGenerator, DescriptorParams, ElementSymbol,
    Structure,
};

/// Reads one JSON object per line, each a serialized `Structure`.
fn load_json_lines(path: &Path) -> Result<Vec<Structure>, DedupError> {
    let text = fs::read_to_string(path)?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_no, line)| {
            serde_json::from_str::<Structure>(line).map_err(|err| {
                DedupError::Configuration(format!(
                    "{}:{}: invalid structure: {err}",
                    path.display(),
                    line_no + 1
                ))
            })
        })
        .collect()
}

/// Toy stand-in for a SOAP implementation: per-species radial histograms
/// around the center sites, averaged over centers.
struct RadialHistogram {
    params: DescriptorParams,
}

impl DescriptorGenerator for RadialHistogram {
    fn params(&self) -> &DescriptorParams {
        &self.params
    }

    fn describe(
        &self,
        structure: &dyn AtomicStructure,
        species: &[ElementSymbol],
        centers: &[usize],
    ) -> Result<Vec<f32>, DedupError> {
        let bins = self.params.n_max as usize;
        let r_cut = self.params.r_cut;
        let mut features = vec![0.0f32; species.len() * bins];
        if centers.is_empty() {
            return Ok(features);
        }
        let positions = structure.positions();
        if positions.len() != structure.len() {
            return Err(DedupError::Descriptor {
                group: species.concat(),
                reason: format!(
                    "{} positions for {} atoms",
                    positions.len(),
                    structure.len()
                ),
            });
        }
        for &center in centers {
            let origin = positions.get(center).ok_or_else(|| DedupError::Descriptor {
                group: species.concat(),
                reason: format!("center site {center} is outside the structure"),
            })?;
            for ((site, symbol), position) in structure.symbols().iter().enumerate().zip(positions) {
                if site == center {
                    continue;
                }
                let Some(channel) = species.iter().position(|known| known == symbol) else {
                    continue;
                };
                let delta = [
                    position[0] - origin[0],
                    position[1] - origin[1],
                    position[2] - origin[2],
                ];
                let distance = (delta[0] * delta[0] + delta[1] * delta[1] + delta[2] * delta[2]).sqrt();
                if distance >= r_cut {
                    continue;
                }
                let bin = ((distance / r_cut) * bins as f64) as usize;
                features[channel * bins + bin.min(bins - 1)] += 1.0;
            }
        }
        let scale = 1.0 / centers.len() as f32;
        features.iter_mut().for_each(|value| *value *= scale);
        Ok(features)
    }
}

fn write_subset(
    name: &str,
    structures: &[Structure],
    indices: &[usize],
) -> Result<(), Box<dyn Error>> {
    let mut out = BufWriter::new(fs::File::create(name)?);
    for &index in indices {
        let structure = structures
            .get(index)
            .ok_or_else(|| format!("selected index {index} is outside the input"))?;
        serde_json::to_writer(&mut out, structure)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

fn write_outputs(structures: &[Structure], run: &DedupRun) -> Result<(), Box<dyn Error>> {
    let lists = &run.outcome.partition;
    write_subset("train_labeled.jsonl", structures, &lists.selected_labeled)?;
    write_subset("train_unlabeled.jsonl", structures, &lists.selected_unlabeled)?;
    write_subset("test_labeled.jsonl", structures, &lists.held_out_labeled)?;
    write_subset("test_unlabeled.jsonl", structures, &lists.held_out_unlabeled)?;
    println!(
        "train labeled: {}, train unlabeled: {}, test labeled: {}, test unlabeled: {}, discarded: {}",
        lists.selected_labeled.len(),
        lists.selected_unlabeled.len(),
        lists.held_out_labeled.len(),
        lists.held_out_unlabeled.len(),
        lists.discarded.len()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    run_dedup_app(
        std::env::args().skip(1),
        load_json_lines,
        |params: &DescriptorParams, _centers: &[ElementSymbol]| {
            Ok(RadialHistogram {
                params: params.clone(),
            })
        },
        write_outputs,
    )
}
