//! Running aggregates and the multi-level aggregation tree.

use std::collections::{BTreeMap, HashMap};

use gridquery_model::{Value, ValueType};

use crate::query::column::AggregationOp;

/// Running state for one aggregated column at one tree node: non-null count,
/// numeric sum, and running min/max.
#[derive(Debug, Clone)]
pub(crate) struct ValueAggregator {
    value_type: ValueType,
    count: u64,
    sum: f64,
    min: Option<Value>,
    max: Option<Value>,
}

impl ValueAggregator {
    fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            count: 0,
            sum: 0.0,
            min: None,
            max: None,
        }
    }

    /// Folds one value in. Nulls are ignored by every aggregate.
    fn aggregate(&mut self, value: &Value) {
        if value.is_null() {
            return;
        }
        self.count += 1;
        if let Some(n) = value.as_number() {
            self.sum += n;
        }
        match &self.min {
            Some(current) if value.compare(current).is_ge() => {}
            _ => self.min = Some(value.clone()),
        }
        match &self.max {
            Some(current) if value.compare(current).is_le() => {}
            _ => self.max = Some(value.clone()),
        }
    }

    /// The aggregate under `op`. With zero non-null inputs, COUNT is 0 and
    /// everything else is the appropriate null.
    fn value(&self, op: AggregationOp) -> Value {
        match op {
            AggregationOp::Count => Value::number(self.count as f64),
            AggregationOp::Sum => {
                if self.count == 0 {
                    Value::Number(None)
                } else {
                    Value::number(self.sum)
                }
            }
            AggregationOp::Avg => {
                if self.count == 0 {
                    Value::Number(None)
                } else {
                    Value::number(self.sum / self.count as f64)
                }
            }
            AggregationOp::Min => self
                .min
                .clone()
                .unwrap_or_else(|| Value::null_of(self.value_type)),
            AggregationOp::Max => self
                .max
                .clone()
                .unwrap_or_else(|| Value::null_of(self.value_type)),
        }
    }
}

#[derive(Debug, Clone)]
struct AggregationNode {
    children: BTreeMap<Value, usize>,
    aggregators: HashMap<String, ValueAggregator>,
}

/// A tree of running aggregates keyed by group-by + pivot value paths.
///
/// Nodes live in an arena (`Vec`) with children as sorted value → index
/// maps; paths are always enumerated top-down, so nodes carry no parent
/// links. The root (index 0) accumulates every row; the node at depth `i`
/// accumulates the rows whose first `i` key values match its path.
#[derive(Debug, Clone)]
pub(crate) struct AggregationTree {
    nodes: Vec<AggregationNode>,
    column_types: Vec<(String, ValueType)>,
}

impl AggregationTree {
    /// `targets` lists the aggregated column ids with their value types.
    pub fn new(targets: Vec<(String, ValueType)>) -> Self {
        let root = AggregationNode {
            children: BTreeMap::new(),
            aggregators: targets
                .iter()
                .map(|(id, ty)| (id.clone(), ValueAggregator::new(*ty)))
                .collect(),
        };
        Self {
            nodes: vec![root],
            column_types: targets,
        }
    }

    fn push_node(&mut self) -> usize {
        let aggregators = self
            .column_types
            .iter()
            .map(|(id, ty)| (id.clone(), ValueAggregator::new(*ty)))
            .collect();
        self.nodes.push(AggregationNode {
            children: BTreeMap::new(),
            aggregators,
        });
        self.nodes.len() - 1
    }

    fn fold(&mut self, node: usize, values: &HashMap<String, Value>) {
        for (id, value) in values {
            if let Some(aggregator) = self.nodes[node].aggregators.get_mut(id) {
                aggregator.aggregate(value);
            }
        }
    }

    /// Walks `path` from the root, creating missing children, folding
    /// `values` into every node along the way.
    pub fn aggregate(&mut self, path: &[Value], values: &HashMap<String, Value>) {
        let mut node = 0;
        self.fold(node, values);
        for key in path {
            let next = match self.nodes[node].children.get(key).copied() {
                Some(child) => child,
                None => {
                    let child = self.push_node();
                    self.nodes[node].children.insert(key.clone(), child);
                    child
                }
            };
            self.fold(next, values);
            node = next;
        }
    }

    /// Ordered key vector of every path ending in a leaf.
    pub fn paths_to_leaves(&self) -> Vec<Vec<Value>> {
        let mut paths = Vec::new();
        let mut prefix = Vec::new();
        self.collect_paths(0, &mut prefix, &mut paths);
        paths
    }

    fn collect_paths(&self, node: usize, prefix: &mut Vec<Value>, out: &mut Vec<Vec<Value>>) {
        let current = &self.nodes[node];
        if current.children.is_empty() {
            out.push(prefix.clone());
            return;
        }
        for (key, &child) in &current.children {
            prefix.push(key.clone());
            self.collect_paths(child, prefix, out);
            prefix.pop();
        }
    }

    fn node_at(&self, path: &[Value]) -> Option<usize> {
        let mut node = 0;
        for key in path {
            node = *self.nodes[node].children.get(key)?;
        }
        Some(node)
    }

    pub fn contains_path(&self, path: &[Value]) -> bool {
        self.node_at(path).is_some()
    }

    /// The aggregate of `column_id` under `op` at the node addressed by
    /// `path`; `None` when the path was never observed.
    pub fn value_at(&self, path: &[Value], column_id: &str, op: AggregationOp) -> Option<Value> {
        let node = self.node_at(path)?;
        self.nodes[node]
            .aggregators
            .get(column_id)
            .map(|aggregator| aggregator.value(op))
    }
}
