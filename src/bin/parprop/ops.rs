use std::collections::HashMap;
use std::fmt::Debug;
use std::fs::File;
use std::io::{stdout, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;

use ndarray::{Array2, Axis};
use num_traits::Float;

use parprop::{Assignment, Error, HierarchicalClustering, Result};

/// Reads in a file formatted as (delimiter separated):
///     id1 val1 val2 val3
///     id2 val1 val2 val3
///
/// Rows are points (first column is the label) unless `is_precalculated` is
/// set, in which case the file holds a square similarity matrix and labels
/// are row numbers.
pub(crate) fn from_file<F>(
    p: PathBuf,
    d: &str,
    is_precalculated: bool,
) -> Result<(Array2<F>, Vec<String>)>
where
    F: Float + Default + FromStr,
    <F as FromStr>::Err: Debug,
{
    let reader = BufReader::new(File::open(p)?);
    let mut labels = Vec::new();
    let mut data = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if !line.contains(d) {
            return Err(Error::Load(format!(
                "line {} does not contain the expected delimiter",
                idx + 1
            )));
        }
        let mut line = line.split(d);
        if !is_precalculated {
            match line.next() {
                Some(id) => labels.push(id.to_string()),
                None => return Err(Error::Load(format!("missing label at line {}", idx + 1))),
            }
        } else {
            labels.push(idx.to_string());
        }
        let mut entry: Vec<F> = Vec::new();
        for value in line {
            match value.parse::<F>() {
                Ok(value) => entry.push(value),
                Err(_) => {
                    return Err(Error::Load(format!(
                        "unparseable value at line {}",
                        idx + 1
                    )))
                }
            }
        }
        data.push(entry);
    }
    if data.is_empty() {
        return Err(Error::Load("input file is empty".to_string()));
    }
    let length = if is_precalculated {
        data.len()
    } else {
        data[0].len()
    };
    for entry in data.iter() {
        if entry.len() != length {
            let message = if is_precalculated {
                "precalculated input data must be square"
            } else {
                "input data rows must all be same length"
            };
            return Err(Error::Load(message.to_string()));
        }
    }
    let mut out = Array2::<F>::default((data.len(), length));
    out.axis_iter_mut(Axis(0))
        .enumerate()
        .for_each(|(idx1, mut row)| {
            row.iter_mut().enumerate().for_each(|(idx2, col)| {
                *col = data[idx1][idx2];
            });
        });
    Ok((out, labels))
}

fn write_clusters<W>(writer: &mut W, clusters: &HashMap<usize, Vec<usize>>, labels: &[String])
where
    W: Write,
{
    let mut ordered: Vec<(&usize, &Vec<usize>)> = clusters.iter().collect();
    ordered.sort_by_key(|(exemplar, _)| **exemplar);
    for (idx, (exemplar, members)) in ordered.into_iter().enumerate() {
        writer
            .write_all(
                format!(
                    ">Cluster={} size={} exemplar={}\n",
                    idx + 1,
                    members.len(),
                    labels[*exemplar]
                )
                .as_ref(),
            )
            .unwrap();
        let mut it = members.iter();
        if let Some(first) = it.next() {
            writer.write_all(labels[*first].as_ref()).unwrap();
        }
        it.for_each(|member| {
            writer.write_all(b",").unwrap();
            writer.write_all(labels[*member].as_ref()).unwrap();
        });
        writer.write_all(b"\n").unwrap();
    }
    writer.flush().unwrap();
}

pub(crate) fn display_results(assignment: &Assignment, labels: &[String]) {
    let clusters = assignment.clusters();
    let mut writer = BufWriter::new(stdout());
    writer
        .write_all(format!("nClusters={} nSamples={}\n", clusters.len(), assignment.len()).as_ref())
        .unwrap();
    write_clusters(&mut writer, &clusters, labels);
}

pub(crate) fn display_hierarchical(clustering: &HierarchicalClustering, labels: &[String]) {
    let clusters = clustering.clusters();
    let mut writer = BufWriter::new(stdout());
    writer
        .write_all(
            format!(
                "nClusters={} nIntermediate={} nSamples={}\n",
                clusters.len(),
                clustering.first_level_exemplar_set().len(),
                clustering.len()
            )
            .as_ref(),
        )
        .unwrap();
    write_clusters(&mut writer, &clusters, labels);
}
