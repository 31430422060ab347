use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::core::{ArcStr, Hash32};
use crate::params::{PropertyList, PropertySpec};
use crate::pipeline::Pipeline;

/// Where a property flowing into a task (or out of the pipeline) comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// Written by the item at this index.
    Item(usize),
    /// Supplied from outside the pipeline.
    External,
}

/// One property edge of the pipeline. A `target` of `None` is the pipeline
/// output.
struct Wire<'a> {
    source: Source,
    target: Option<usize>,
    spec: &'a PropertySpec,
}

fn source_of(writers: &HashMap<&ArcStr, usize>, name: &ArcStr) -> Source {
    writers
        .get(name)
        .map_or(Source::External, |&index| Source::Item(index))
}

/// Serializable snapshot of a resolved pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    pub id: String,
    pub items: Vec<String>,
    pub inputs: Vec<SpecSummary>,
    pub outputs: Vec<SpecSummary>,
    pub consuming: Vec<SpecSummary>,
    pub filters: Vec<SpecSummary>,
    pub pipethrough: Vec<SpecSummary>,
    pub locals: Vec<SpecSummary>,
    pub aliases: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SpecSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

fn summarize(list: &PropertyList) -> Vec<SpecSummary> {
    list.iter()
        .map(|spec| SpecSummary {
            name: spec.name.to_string(),
            ty: spec.ty.short_name(),
        })
        .collect()
}

impl Pipeline {
    /// A short, stable identifier derived from what the pipeline writes.
    ///
    /// Outputs and filters are listed by name, prefixed by the proxy they
    /// were requested under when aliasing renamed them. The list is preceded
    /// by a BLAKE3 digest prefix so that long ids stay distinguishable when
    /// truncated.
    pub fn pipeline_id(&self) -> String {
        let mut labels = Vec::new();

        for spec in self.output_specs.iter().chain(&self.filter_specs) {
            let mut aliased = false;

            for (proxy, provider) in self.used_aliases.local_entries() {
                if *provider == spec.name {
                    labels.push(format!("{proxy}-{provider}"));
                    aliased = true;
                }
            }

            if !aliased {
                labels.push(spec.name.to_string());
            }
        }

        let joined = labels.join("_");
        let digest = Hash32::hash(joined.as_bytes()).to_hex();

        format!("{}_{joined}", &digest[..6])
    }

    fn wires(&self) -> Vec<Wire<'_>> {
        let mut wires = Vec::new();
        let mut writers: HashMap<&ArcStr, usize> = HashMap::new();

        for (index, binding) in self.bindings.iter().enumerate() {
            let reads = binding
                .inputs
                .iter()
                .chain(&binding.filters)
                .chain(&binding.consuming);

            for spec in reads {
                wires.push(Wire {
                    source: source_of(&writers, &spec.name),
                    target: Some(index),
                    spec,
                });
            }

            for spec in &binding.consuming {
                writers.remove(&spec.name);
            }
            for spec in binding.outputs.iter().chain(&binding.filters) {
                writers.insert(&spec.name, index);
            }
        }

        let results = self
            .output_specs
            .iter()
            .chain(&self.filter_specs)
            .chain(&self.pipethrough_specs);

        for spec in results {
            wires.push(Wire {
                source: source_of(&writers, &spec.name),
                target: None,
                spec,
            });
        }

        wires
    }

    /// The data flow between items as a graph.
    ///
    /// Node weights are indices into [`items`](Pipeline::items) and node
    /// indices match them. Every edge carries the name of the property
    /// written by its source and read by its target.
    pub fn dependency_graph(&self) -> DiGraph<usize, ArcStr> {
        let mut graph = DiGraph::with_capacity(self.items.len(), 0);
        let nodes: Vec<NodeIndex> = (0..self.items.len()).map(|index| graph.add_node(index)).collect();

        for wire in self.wires() {
            if let (Source::Item(source), Some(target)) = (wire.source, wire.target) {
                graph.add_edge(nodes[source], nodes[target], wire.spec.name.clone());
            }
        }

        graph
    }

    /// The first item dependency that is neither supplied from outside nor
    /// written by an earlier item, as `(item index, property)`.
    pub fn unsatisfied_dependency(&self) -> Option<(usize, ArcStr)> {
        let mut available: HashSet<&ArcStr> = self
            .fixed_specs
            .names()
            .chain(self.input_specs.names())
            .chain(self.filter_specs.names())
            .chain(self.consuming_specs.names())
            .chain(self.pipethrough_specs.names())
            .collect();

        for (index, binding) in self.bindings.iter().enumerate() {
            let reads = binding
                .inputs
                .names()
                .chain(binding.filters.names())
                .chain(binding.consuming.names());

            for name in reads {
                if !available.contains(name) {
                    return Some((index, name.clone()));
                }
            }

            for name in binding.consuming.names() {
                available.remove(name);
            }
            available.extend(binding.outputs.names());
            available.extend(binding.filters.names());
        }

        None
    }

    /// Whether every item only depends on properties supplied from outside or
    /// written by an earlier item.
    pub fn verify_order(&self) -> bool {
        self.unsatisfied_dependency().is_none()
    }

    /// Renders the data flow as a Mermaid flowchart.
    pub fn to_mermaid(&self) -> String {
        self.to_string()
    }

    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            id: self.pipeline_id(),
            items: self.items.iter().map(|task| task.name().to_string()).collect(),
            inputs: summarize(&self.input_specs),
            outputs: summarize(&self.output_specs),
            consuming: summarize(&self.consuming_specs),
            filters: summarize(&self.filter_specs),
            pipethrough: summarize(&self.pipethrough_specs),
            locals: summarize(&self.local_specs),
            aliases: self
                .used_aliases
                .local_entries()
                .map(|(proxy, provider)| (proxy.to_string(), provider.to_string()))
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.summary())
    }
}

fn label(spec: &PropertySpec) -> String {
    format!("{}: {}", spec.name, spec.ty.short_name())
        .replace('"', "\\\"")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        for (index, task) in self.items.iter().enumerate() {
            let name = task.name().replace('"', "\\\"");
            writeln!(f, "    t{index}[\"{name}\"]")?;
        }

        let mut external: HashMap<&ArcStr, usize> = HashMap::new();

        for wire in self.wires() {
            let source = match wire.source {
                Source::Item(index) => format!("t{index}"),
                Source::External => {
                    let next = external.len();
                    let id = *external.entry(&wire.spec.name).or_insert(next);
                    if id == next {
                        let name = wire.spec.name.replace('"', "\\\"");
                        writeln!(f, "    p{id}([\"{name}\"])")?;
                    }
                    format!("p{id}")
                }
            };

            match wire.target {
                Some(index) => writeln!(f, "    {source} -- \"{}\" --> t{index}", label(wire.spec))?,
                None => writeln!(f, "    {source} -- \"{}\" --> Output", label(wire.spec))?,
            }
        }

        writeln!(f, "    Output[Output]")?;

        Ok(())
    }
}
