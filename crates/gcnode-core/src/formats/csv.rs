//! CSV format support.
//!
//! - Edge lists: `src,dst[,feature...]`, one edge per line.
//! - Feature matrices: one row of floats per node.
//! - Labels: `label` or `node,label` per line.
//!
//! A first line whose leading field is not numeric is treated as a header.

use crate::{Error, GraphData, Result};
use std::io::Read;

/// Parsed edge list with optional per-edge features.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeList {
    pub src: Vec<usize>,
    pub dst: Vec<usize>,
    /// Row-major edge features and their width.
    pub attr: Option<(Vec<f32>, usize)>,
}

impl EdgeList {
    pub fn len(&self) -> usize {
        self.src.len()
    }

    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }

    /// Largest endpoint + 1, or 0 for an empty list.
    pub fn min_num_nodes(&self) -> Result<usize> {
        match self.src.iter().chain(&self.dst).max() {
            Some(&m) => node_count(m),
            None => Ok(0),
        }
    }
}

/// CSV format handler.
pub struct Csv;

impl Csv {
    /// Non-empty records with the file line each one sits on.
    fn records<R: Read>(mut input: R) -> Result<Vec<(usize, csv::StringRecord)>> {
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(bytes.as_slice());

        let mut out = Vec::new();
        let mut record = csv::StringRecord::new();
        let mut first = true;
        while reader.read_record(&mut record)? {
            // comment and blank lines are skipped inside the read, so count
            // back from where the record ended
            let end = reader.position();
            let ends_with_newline = end
                .byte()
                .checked_sub(1)
                .and_then(|b| bytes.get(b as usize))
                == Some(&b'\n');
            let line = (end.line() as usize).saturating_sub(usize::from(ends_with_newline));

            if record.iter().all(str::is_empty) {
                continue;
            }
            let is_header = first
                && record
                    .get(0)
                    .is_some_and(|field| field.parse::<f64>().is_err());
            first = false;
            if !is_header {
                out.push((line, record.clone()));
            }
        }
        Ok(out)
    }

    /// Read an edge list. Columns after the first two become edge features;
    /// every line must carry the same number of them.
    pub fn read_edges<R: Read>(reader: R) -> Result<EdgeList> {
        let mut edges = EdgeList::default();
        let mut attr = Vec::new();
        let mut width = None;

        for (line, record) in Self::records(reader)? {
            if record.len() < 2 {
                return Err(Error::Parse {
                    line,
                    message: format!("expected at least 2 columns, got {}", record.len()),
                });
            }
            edges.src.push(parse_field(&record[0], line)?);
            edges.dst.push(parse_field(&record[1], line)?);

            let extra = record.len() - 2;
            match width {
                None => width = Some(extra),
                Some(w) if w != extra => {
                    return Err(Error::Parse {
                        line,
                        message: format!("expected {w} edge feature columns, got {extra}"),
                    })
                }
                Some(_) => {}
            }
            for field in record.iter().skip(2) {
                attr.push(parse_field(field, line)?);
            }
        }

        if let Some(w) = width.filter(|&w| w > 0) {
            edges.attr = Some((attr, w));
        }
        Ok(edges)
    }

    /// Read a dense float matrix, one row per line.
    pub fn read_matrix<R: Read>(reader: R) -> Result<Vec<Vec<f32>>> {
        Self::records(reader)?
            .into_iter()
            .map(|(line, record)| {
                record
                    .iter()
                    .map(|f| parse_field(f, line))
                    .collect::<Result<Vec<f32>>>()
            })
            .collect()
    }

    /// Read node labels.
    ///
    /// One column: labels in node order. Two columns: `node,label` pairs in
    /// any order; every node from 0 to the largest id must appear.
    pub fn read_labels<R: Read>(reader: R) -> Result<Vec<usize>> {
        let records = Self::records(reader)?;
        if records.iter().all(|(_, r)| r.len() == 1) {
            return records
                .iter()
                .map(|(line, r)| parse_field(&r[0], *line))
                .collect();
        }

        let mut pairs: Vec<(usize, usize)> = Vec::with_capacity(records.len());
        for (line, record) in &records {
            if record.len() != 2 {
                return Err(Error::Parse {
                    line: *line,
                    message: format!("expected `node,label`, got {} columns", record.len()),
                });
            }
            pairs.push((parse_field(&record[0], *line)?, parse_field(&record[1], *line)?));
        }
        let n = match pairs.iter().map(|&(node, _)| node).max() {
            Some(m) => node_count(m)?,
            None => 0,
        };
        let mut labels: Vec<Option<usize>> = vec![None; n];
        for (node, label) in pairs {
            labels[node] = Some(label);
        }
        labels
            .into_iter()
            .enumerate()
            .map(|(node, l)| {
                l.ok_or_else(|| Error::InvalidConfig(format!("no label for node {node}")))
            })
            .collect()
    }
}

fn node_count(max_id: usize) -> Result<usize> {
    max_id
        .checked_add(1)
        .ok_or_else(|| Error::InvalidConfig(format!("node id {max_id} is too large")))
}

fn parse_field<T: std::str::FromStr>(field: &str, line: usize) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    field.parse().map_err(|e: T::Err| Error::Parse {
        line,
        message: format!("`{field}`: {e}"),
    })
}

/// Assemble a graph from parsed CSV inputs.
///
/// The node count comes from the feature rows when given, otherwise from the
/// largest endpoint or label count; without features nodes get one-hot
/// identity features.
pub fn load_graph(
    edges: EdgeList,
    features: Option<Vec<Vec<f32>>>,
    labels: Option<Vec<usize>>,
) -> Result<GraphData> {
    let num_nodes = match &features {
        Some(rows) => rows.len(),
        None => edges
            .min_num_nodes()?
            .max(labels.as_ref().map_or(0, Vec::len)),
    };

    let mut builder = GraphData::builder(num_nodes).edge_index(edges.src, edges.dst);
    if let Some(rows) = features {
        builder = builder.node_features(rows);
    }
    if let Some((attr, width)) = edges.attr {
        builder = builder.edge_features_flat(attr, width);
    }
    if let Some(y) = labels {
        builder = builder.labels(y);
    }
    builder.build()
}
