//! Cycle detection, topological sort, and dependency-level computation over
//! a task template's step dependency graph.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::config::DependencyGraphConfig;
use crate::model::NamedTask;

/// The result of analyzing one or more templates' dependency graphs.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphReport {
    pub nodes: Vec<String>,
    pub edges: Vec<(String, String)>,
    /// Topological order, empty when `cycles` is non-empty.
    pub topology: Vec<String>,
    /// Each inner vec is one cycle, expressed as the sequence of step names
    /// from the back-edge target back to itself.
    pub cycles: Vec<Vec<String>>,
    pub levels: BTreeMap<String, usize>,
    pub roots: Vec<String>,
    pub leaves: Vec<String>,
    pub summary: String,
    /// Advisory weighted score from `DependencyGraphConfig`: orphan steps
    /// and depth beyond the configured allowance each contribute, scaled
    /// by `severity_multiplier`. `0.0` for a template with a cycle, since
    /// no levels are computed for one.
    pub impact_score: f64,
    /// Sum of `duration_estimates` along the longest (by level) root-to-
    /// leaf path, i.e. the slowest chain of steps that must run serially.
    /// `None` for a template with a cycle.
    pub critical_path_duration_seconds: Option<f64>,
}

impl GraphReport {
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Whether `impact_score` has crossed the configured advisory
    /// threshold. Never blocks registration; callers may choose to log a
    /// warning or surface this in a validation report.
    #[must_use]
    pub fn exceeds_impact_threshold(&self, config: &DependencyGraphConfig) -> bool {
        self.impact_score >= config.threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// `analyze_with_config` using `DependencyGraphConfig::default()`.
#[must_use]
pub fn analyze(template: &NamedTask) -> GraphReport {
    analyze_with_config(template, &DependencyGraphConfig::default())
}

/// Builds a `GraphReport` for a single task template's step graph.
///
/// Dependencies point from a step to the steps it depends on
/// (`step.dependencies`); edges in the report are recorded in the natural
/// `from_step -> to_step` execution-order direction, i.e. `(dependency,
/// dependent)`, so that `roots` (in-degree 0 in this report's edge
/// direction) are the steps with no dependencies and `leaves` are steps
/// nothing depends on.
#[must_use]
pub fn analyze_with_config(template: &NamedTask, config: &DependencyGraphConfig) -> GraphReport {
    let nodes: Vec<String> = template.steps.iter().map(|s| s.name.clone()).collect();
    let node_set: BTreeSet<&str> = nodes.iter().map(String::as_str).collect();

    // edges[from] = steps that depend on `from` (i.e. `from`'s children).
    let mut children: BTreeMap<&str, BTreeSet<&str>> =
        nodes.iter().map(|n| (n.as_str(), BTreeSet::new())).collect();
    let mut edges = Vec::new();
    for step in &template.steps {
        for dep in &step.dependencies {
            if let Some(set) = children.get_mut(dep.as_str()) {
                set.insert(step.name.as_str());
            }
            edges.push((dep.clone(), step.name.clone()));
        }
    }
    edges.sort();

    let cycles = detect_cycles(&nodes, &children);

    let topology = if cycles.is_empty() {
        topological_sort(&nodes, &children, template)
    } else {
        Vec::new()
    };

    let levels = if cycles.is_empty() {
        compute_levels(&nodes, template)
    } else {
        BTreeMap::new()
    };

    let roots: Vec<String> = template
        .steps
        .iter()
        .filter(|s| s.dependencies.is_empty())
        .map(|s| s.name.clone())
        .collect();

    let leaves: Vec<String> = nodes
        .iter()
        .filter(|n| children.get(n.as_str()).map_or(true, BTreeSet::is_empty))
        .cloned()
        .collect();

    let summary = if cycles.is_empty() {
        format!(
            "{} steps, {} edges, {} roots, {} leaves, {} levels",
            node_set.len(),
            edges.len(),
            roots.len(),
            leaves.len(),
            levels.values().max().copied().map_or(0, |m| m + 1)
        )
    } else {
        format!("{} cycle(s) detected", cycles.len())
    };

    let orphan_count = if nodes.len() > 1 {
        template
            .steps
            .iter()
            .filter(|s| s.dependencies.is_empty() && children.get(s.name.as_str()).map_or(true, BTreeSet::is_empty))
            .count()
    } else {
        0
    };

    let impact_score = if cycles.is_empty() {
        let max_level = levels.values().max().copied().unwrap_or(0);
        let depth_overage = max_level.saturating_sub(config.deep_chain_level_allowance.saturating_sub(1));
        (orphan_count as f64 * config.orphan_step_impact + depth_overage as f64 * config.deep_chain_penalty)
            * config.severity_multiplier
    } else {
        0.0
    };

    let critical_path_duration_seconds = if cycles.is_empty() {
        Some(critical_path_duration(&nodes, &levels, config))
    } else {
        None
    };

    GraphReport {
        nodes,
        edges,
        topology,
        cycles,
        levels,
        roots,
        leaves,
        summary,
        impact_score,
        critical_path_duration_seconds,
    }
}

/// Sums `duration_estimates` along the longest root-to-leaf chain: for
/// each level (deepest first), the slowest step at that level anchors the
/// running total, approximating the serial critical path through the DAG.
fn critical_path_duration(nodes: &[String], levels: &BTreeMap<String, usize>, config: &DependencyGraphConfig) -> f64 {
    let mut by_level: BTreeMap<usize, f64> = BTreeMap::new();
    for node in nodes {
        let level = levels.get(node).copied().unwrap_or(0);
        let duration = config.duration_estimate(node);
        let entry = by_level.entry(level).or_insert(0.0);
        if duration > *entry {
            *entry = duration;
        }
    }
    by_level.values().sum()
}

/// DFS three-color cycle detection. On finding a back edge (an edge into a
/// gray node), records the cycle as the slice of the current DFS stack from
/// that node to the current node, inclusive, closing the loop by repeating
/// the start node.
fn detect_cycles<'a>(
    nodes: &'a [String],
    children: &BTreeMap<&'a str, BTreeSet<&'a str>>,
) -> Vec<Vec<String>> {
    let mut color: BTreeMap<&str, Color> =
        nodes.iter().map(|n| (n.as_str(), Color::White)).collect();
    let mut stack: Vec<&str> = Vec::new();
    let mut cycles = Vec::new();

    for start in nodes {
        if color[start.as_str()] == Color::White {
            visit(start, children, &mut color, &mut stack, &mut cycles);
        }
    }
    cycles
}

fn visit<'a>(
    node: &'a str,
    children: &BTreeMap<&'a str, BTreeSet<&'a str>>,
    color: &mut BTreeMap<&'a str, Color>,
    stack: &mut Vec<&'a str>,
    cycles: &mut Vec<Vec<String>>,
) {
    color.insert(node, Color::Gray);
    stack.push(node);

    if let Some(kids) = children.get(node) {
        for &child in kids {
            match color[child] {
                Color::White => visit(child, children, color, stack, cycles),
                Color::Gray => {
                    let start = stack.iter().position(|&n| n == child).unwrap_or(0);
                    let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(child.to_string());
                    cycles.push(cycle);
                }
                Color::Black => {}
            }
        }
    }

    stack.pop();
    color.insert(node, Color::Black);
}

/// Kahn's algorithm. Ties are broken by template insertion order, then
/// lexicographic step name, so that analysis of the same template is
/// byte-equal across runs.
fn topological_sort<'a>(
    nodes: &'a [String],
    children: &BTreeMap<&'a str, BTreeSet<&'a str>>,
    template: &NamedTask,
) -> Vec<String> {
    let insertion_order: BTreeMap<&str, usize> = template
        .steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.as_str(), i))
        .collect();

    let mut in_degree: BTreeMap<&str, usize> = nodes.iter().map(|n| (n.as_str(), 0)).collect();
    for kids in children.values() {
        for &child in kids {
            *in_degree.get_mut(child).unwrap() += 1;
        }
    }

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&n, _)| n)
        .collect();
    ready.sort_by_key(|n| (insertion_order[n], *n));

    let mut order = Vec::with_capacity(nodes.len());
    while !ready.is_empty() {
        ready.sort_by_key(|n| (insertion_order[n], *n));
        let node = ready.remove(0);
        order.push(node.to_string());

        if let Some(kids) = children.get(node) {
            for &child in kids {
                let deg = in_degree.get_mut(child).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    ready.push(child);
                }
            }
        }
    }
    order
}

/// BFS level computation: `level(v) = 1 + max(level(u))` over `v`'s
/// dependencies; roots are level 0.
fn compute_levels(nodes: &[String], template: &NamedTask) -> BTreeMap<String, usize> {
    let step_by_name: BTreeMap<&str, &crate::model::StepTemplate> =
        template.steps.iter().map(|s| (s.name.as_str(), s)).collect();

    let mut levels: BTreeMap<String, usize> = BTreeMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    for step in &template.steps {
        if step.dependencies.is_empty() {
            levels.insert(step.name.clone(), 0);
            queue.push_back(step.name.as_str());
        }
    }

    // Children map for forward traversal.
    let mut children: BTreeMap<&str, BTreeSet<&str>> =
        nodes.iter().map(|n| (n.as_str(), BTreeSet::new())).collect();
    for step in &template.steps {
        for dep in &step.dependencies {
            children.entry(dep.as_str()).or_default().insert(step.name.as_str());
        }
    }

    while let Some(node) = queue.pop_front() {
        let node_level = levels[node];
        if let Some(kids) = children.get(node) {
            for &child in kids {
                let child_step = step_by_name[child];
                let all_deps_leveled = child_step
                    .dependencies
                    .iter()
                    .all(|d| levels.contains_key(d.as_str()));
                if !all_deps_leveled {
                    continue;
                }
                let candidate = node_level + 1;
                let entry = levels.entry(child.to_string()).or_insert(candidate);
                if candidate > *entry {
                    *entry = candidate;
                }
                queue.push_back(child);
            }
        }
    }
    levels
}
