//! Typed intermediate form of an ffmpeg `-filter_complex` graph.
//!
//! Stages carry labelled inputs, an ordered filter chain and labelled
//! outputs. Text is produced only at the encoder boundary, after
//! [`FilterGraph::validate`] has checked that every label is produced
//! once, consumed once, and that exactly one output is left dangling.

use std::collections::{HashMap, HashSet};
use std::fmt;

use mixdown_common::error::{MixError, MixResult};

/// A link label such as `[0:a]` or `[t1_cut]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pad(String);

impl Pad {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Audio stream of the `index`-th engine input.
    pub fn input(index: usize) -> Self {
        Self(format!("{index}:a"))
    }

    pub fn label(&self) -> &str {
        &self.0
    }

    /// Whether this pad refers to an engine input rather than a link.
    pub fn is_input(&self) -> bool {
        self.input_index().is_some()
    }

    fn input_index(&self) -> Option<usize> {
        self.0.strip_suffix(":a")?.parse().ok()
    }
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FilterArg {
    key: Option<String>,
    value: String,
}

/// One filter with its options, e.g. `atrim=start=1.000000:end=2.000000`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    name: String,
    args: Vec<FilterArg>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: vec![],
        }
    }

    /// Append a `key=value` option.
    pub fn arg(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.args.push(FilterArg {
            key: Some(key.into()),
            value: value.to_string(),
        });
        self
    }

    /// Append a positional option.
    pub fn value(mut self, value: impl fmt::Display) -> Self {
        self.args.push(FilterArg {
            key: None,
            value: value.to_string(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of a keyed option.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|a| a.key.as_deref() == Some(key))
            .map(|a| a.value.as_str())
    }

    /// Value of the `index`-th positional option.
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.args
            .iter()
            .filter(|a| a.key.is_none())
            .nth(index)
            .map(|a| a.value.as_str())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            match &arg.key {
                Some(key) => write!(f, "{key}={}", arg.value)?,
                None => f.write_str(&arg.value)?,
            }
        }
        Ok(())
    }
}

/// Inputs, a comma-separated filter chain, and outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStage {
    pub inputs: Vec<Pad>,
    pub filters: Vec<Filter>,
    pub outputs: Vec<Pad>,
}

impl FilterStage {
    pub fn new(inputs: Vec<Pad>, filters: Vec<Filter>, outputs: Vec<Pad>) -> Self {
        Self {
            inputs,
            filters,
            outputs,
        }
    }

    /// Single-input, single-output chain.
    pub fn chain(input: Pad, filters: Vec<Filter>, output: Pad) -> Self {
        Self::new(vec![input], filters, vec![output])
    }

    /// Name of the first filter, which identifies the stage's operation.
    pub fn op(&self) -> &str {
        self.filters.first().map(Filter::name).unwrap_or("")
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pad in &self.inputs {
            write!(f, "{pad}")?;
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{filter}")?;
        }
        for pad in &self.outputs {
            write!(f, "{pad}")?;
        }
        Ok(())
    }
}

/// Ordered list of stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    pub stages: Vec<FilterStage>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: FilterStage) {
        self.stages.push(stage);
    }

    /// Stages joined by `;`, ready for `-filter_complex`.
    pub fn to_filter_complex(&self) -> String {
        self.stages
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Check label discipline and return the single dangling output.
    ///
    /// Every link label must be produced by exactly one stage before it is
    /// consumed, and consumed at most once. Engine inputs must be in range
    /// and consumed at most once. Exactly one produced label may remain
    /// unconsumed.
    pub fn validate(&self, input_count: usize) -> MixResult<Pad> {
        let mut produced: HashSet<&Pad> = HashSet::new();
        let mut consumed: HashSet<&Pad> = HashSet::new();
        let mut order: HashMap<&Pad, usize> = HashMap::new();

        for (idx, stage) in self.stages.iter().enumerate() {
            if stage.filters.is_empty() {
                return Err(MixError::graph_build(format!("stage {idx} has no filters")));
            }
            for pad in &stage.inputs {
                if let Some(input) = pad.input_index() {
                    if input >= input_count {
                        return Err(MixError::graph_build(format!(
                            "stage {idx} reads {pad} but only {input_count} inputs exist"
                        )));
                    }
                } else if !produced.contains(pad) {
                    return Err(MixError::graph_build(format!(
                        "stage {idx} consumes {pad} before it is produced"
                    )));
                }
                if !consumed.insert(pad) {
                    return Err(MixError::graph_build(format!("{pad} is consumed twice")));
                }
            }
            for pad in &stage.outputs {
                if pad.is_input() || !produced.insert(pad) {
                    return Err(MixError::graph_build(format!("{pad} is produced twice")));
                }
                order.insert(pad, idx);
            }
        }

        let mut dangling: Vec<&Pad> = produced.difference(&consumed).copied().collect();
        dangling.sort_by_key(|pad| order.get(pad).copied().unwrap_or(0));
        match dangling.as_slice() {
            [single] => Ok((*single).clone()),
            [] => Err(MixError::graph_build("graph has no output")),
            many => Err(MixError::graph_build(format!(
                "graph has {} unconnected outputs: {}",
                many.len(),
                many.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("")
            ))),
        }
    }
}

/// Format a time or ratio the way every stage renders numbers.
pub fn num(value: f64) -> String {
    format!("{value:.6}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trim(start: f64, end: f64) -> Filter {
        Filter::new("atrim").arg("start", num(start)).arg("end", num(end))
    }

    #[test]
    fn test_filter_rendering() {
        assert_eq!(
            trim(1.0, 2.5).to_string(),
            "atrim=start=1.000000:end=2.500000"
        );
        assert_eq!(Filter::new("anull").to_string(), "anull");
        assert_eq!(
            Filter::new("asetpts").value("PTS-STARTPTS").to_string(),
            "asetpts=PTS-STARTPTS"
        );
    }

    #[test]
    fn test_stage_rendering() {
        let stage = FilterStage::chain(
            Pad::input(0),
            vec![trim(0.0, 1.0), Filter::new("asetpts").value("PTS-STARTPTS")],
            Pad::new("t0_cut"),
        );
        assert_eq!(
            stage.to_string(),
            "[0:a]atrim=start=0.000000:end=1.000000,asetpts=PTS-STARTPTS[t0_cut]"
        );
        assert_eq!(stage.op(), "atrim");
    }

    #[test]
    fn test_validate_finds_single_output() {
        let mut graph = FilterGraph::new();
        graph.push(FilterStage::chain(
            Pad::input(0),
            vec![Filter::new("anull")],
            Pad::new("a0"),
        ));
        graph.push(FilterStage::chain(
            Pad::input(1),
            vec![Filter::new("anull")],
            Pad::new("a1"),
        ));
        graph.push(FilterStage::new(
            vec![Pad::new("a0"), Pad::new("a1")],
            vec![Filter::new("concat").arg("n", 2).arg("v", 0).arg("a", 1)],
            vec![Pad::new("out")],
        ));
        assert_eq!(graph.validate(2).unwrap(), Pad::new("out"));
        assert_eq!(
            graph.to_filter_complex(),
            "[0:a]anull[a0];[1:a]anull[a1];[a0][a1]concat=n=2:v=0:a=1[out]"
        );
    }

    #[test]
    fn test_validate_rejects_dangling_and_reuse() {
        let mut graph = FilterGraph::new();
        graph.push(FilterStage::chain(
            Pad::input(0),
            vec![Filter::new("anull")],
            Pad::new("a0"),
        ));
        graph.push(FilterStage::chain(
            Pad::input(0),
            vec![Filter::new("anull")],
            Pad::new("a1"),
        ));
        assert!(graph.validate(1).is_err());

        let mut graph = FilterGraph::new();
        graph.push(FilterStage::chain(
            Pad::new("nowhere"),
            vec![Filter::new("anull")],
            Pad::new("a0"),
        ));
        assert!(graph.validate(1).is_err());

        let mut graph = FilterGraph::new();
        graph.push(FilterStage::chain(
            Pad::input(3),
            vec![Filter::new("anull")],
            Pad::new("a0"),
        ));
        assert!(graph.validate(1).is_err());
    }
}
