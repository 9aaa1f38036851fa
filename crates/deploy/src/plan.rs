//! Deployment planning: tag selection, dependency closure and ordering.
//!
//! Planning never touches the network. Every configuration problem it can find
//! (duplicates, cycles, missing dependencies) is reported before the first
//! transaction is submitted.

use std::{
    collections::{BTreeSet, HashMap},
    convert::Infallible,
    fmt,
    str::FromStr,
};

use crate::{
    Arg, ArtifactDescriptor, ConfigurationError, DeploymentRecord, DeploymentRegistry,
    NetworkId, OrchestrationError,
};

/// Reserved selector matching every artifact.
pub const ALL_SELECTOR: &str = "all";

/// Which artifacts a run is about: tags or artifact names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    selectors: BTreeSet<String>,
}

impl Selection {
    pub fn all() -> Self {
        Self::new([ALL_SELECTOR])
    }

    /// An empty selector list means everything.
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let selectors: BTreeSet<String> = selectors.into_iter().map(Into::into).collect();
        if selectors.is_empty() {
            return Self::all();
        }
        Self { selectors }
    }

    pub fn is_all(&self) -> bool {
        self.selectors.contains(ALL_SELECTOR)
    }

    pub fn matches(&self, descriptor: &ArtifactDescriptor) -> bool {
        self.is_all()
            || self
                .selectors
                .iter()
                .any(|selector| descriptor.has_tag(selector))
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::all()
    }
}

impl FromStr for Selection {
    type Err = Infallible;

    /// Parse a comma separated list, e.g. `RewardToken,Governance`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(
            s.split(',')
                .map(str::trim)
                .filter(|selector| !selector.is_empty()),
        ))
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let selectors: Vec<&str> = self.selectors.iter().map(String::as_str).collect();
        write!(f, "{}", selectors.join(","))
    }
}

/// What the deployer will do with an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// Submit a deployment transaction.
    Deploy,
    /// Keep the existing deployment.
    Reuse(DeploymentRecord),
}

/// One artifact in the deployment order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub descriptor: ArtifactDescriptor,
    pub action: PlannedAction,
    /// `false` when the artifact is only here as a dependency of a selected one.
    pub selected: bool,
}

/// Ordered list of artifacts to deploy or reuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    pub network: NetworkId,
    pub entries: Vec<PlanEntry>,
}

impl DeploymentPlan {
    /// Compute the plan for `selection` on `network`.
    ///
    /// Selected artifacts already recorded on the network are reused unless
    /// `force` is set. Dependencies outside the selection are only deployed when
    /// they have no record yet; `force` never applies to them.
    pub fn build<R: DeploymentRegistry + ?Sized>(
        descriptors: &[ArtifactDescriptor],
        selection: &Selection,
        registry: &R,
        network: NetworkId,
        force: bool,
    ) -> Result<Self, OrchestrationError> {
        let index = validate(descriptors)?;

        let selected: BTreeSet<usize> = descriptors
            .iter()
            .enumerate()
            .filter(|(_, descriptor)| selection.matches(descriptor))
            .map(|(i, _)| i)
            .collect();

        if selected.is_empty() {
            tracing::warn!(selection = %selection, "No artifact matches the selection, nothing to deploy");
            return Ok(Self {
                network,
                entries: Vec::new(),
            });
        }

        let lookup = |name: &str| registry.get(name, network).map_err(OrchestrationError::Registry);

        // Closure over the dependencies of everything that will be deployed.
        let mut actions: HashMap<usize, PlannedAction> = HashMap::new();
        let mut worklist: Vec<usize> = selected.iter().copied().collect();

        while let Some(i) = worklist.pop() {
            if actions.contains_key(&i) {
                continue;
            }
            let descriptor = &descriptors[i];

            let action = match lookup(&descriptor.name)? {
                Some(record) if !(force && selected.contains(&i)) => PlannedAction::Reuse(record),
                _ => PlannedAction::Deploy,
            };

            if action == PlannedAction::Deploy {
                for dependency in descriptor.dependencies() {
                    match index.get(dependency) {
                        Some(&j) if selected.contains(&j) => worklist.push(j),
                        Some(&j) => {
                            if lookup(dependency)?.is_none() {
                                worklist.push(j);
                            }
                        }
                        None => {
                            if lookup(dependency)?.is_none() {
                                return Err(ConfigurationError::MissingDependency {
                                    artifact: descriptor.name.clone(),
                                    dependency: dependency.to_string(),
                                }
                                .into());
                            }
                        }
                    }
                }
            }

            actions.insert(i, action);
        }

        let order = topological_order(descriptors, &index, &actions.keys().copied().collect())?;

        let entries = order
            .into_iter()
            .map(|i| PlanEntry {
                descriptor: descriptors[i].clone(),
                action: actions
                    .remove(&i)
                    .unwrap_or(PlannedAction::Deploy),
                selected: selected.contains(&i),
            })
            .collect();

        Ok(Self { network, entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that will submit a deployment transaction.
    pub fn to_deploy(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.action == PlannedAction::Deploy)
    }
}

impl fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "Nothing to deploy on network {}", self.network);
        }

        writeln!(f, "Deployment plan for network {}:", self.network)?;
        for (n, entry) in self.entries.iter().enumerate() {
            let action = match &entry.action {
                PlannedAction::Deploy => "deploy".to_string(),
                PlannedAction::Reuse(record) => format!("reuse {}", record.address),
            };
            let origin = if entry.selected { "" } else { " (dependency)" };
            writeln!(f, "  {}. {} -> {}{}", n + 1, entry.descriptor.name, action, origin)?;
        }
        Ok(())
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Check names, constructor arguments and acyclicity of the whole descriptor set.
///
/// Returns the name -> position index.
fn validate(descriptors: &[ArtifactDescriptor]) -> Result<HashMap<&str, usize>, ConfigurationError> {
    let mut index = HashMap::new();

    for (i, descriptor) in descriptors.iter().enumerate() {
        if !is_valid_name(&descriptor.name) {
            return Err(ConfigurationError::InvalidName(descriptor.name.clone()));
        }
        if index.insert(descriptor.name.as_str(), i).is_some() {
            return Err(ConfigurationError::DuplicateArtifact(descriptor.name.clone()));
        }
        if descriptor
            .args
            .iter()
            .any(|arg| matches!(arg, Arg::OutputOf { .. }))
        {
            return Err(ConfigurationError::OutputInConstructor(descriptor.name.clone()));
        }
    }

    if let Some(cycle) = CycleFinder::new(descriptors, &index).find() {
        return Err(ConfigurationError::Cycle(cycle));
    }

    Ok(index)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first search for a dependency cycle among declared artifacts.
struct CycleFinder<'a> {
    descriptors: &'a [ArtifactDescriptor],
    index: &'a HashMap<&'a str, usize>,
    marks: Vec<Mark>,
    stack: Vec<usize>,
}

impl<'a> CycleFinder<'a> {
    fn new(descriptors: &'a [ArtifactDescriptor], index: &'a HashMap<&'a str, usize>) -> Self {
        Self {
            descriptors,
            index,
            marks: vec![Mark::Unvisited; descriptors.len()],
            stack: Vec::new(),
        }
    }

    fn find(mut self) -> Option<Vec<String>> {
        (0..self.descriptors.len()).find_map(|i| {
            if self.marks[i] == Mark::Unvisited {
                self.visit(i)
            } else {
                None
            }
        })
    }

    fn visit(&mut self, i: usize) -> Option<Vec<String>> {
        self.marks[i] = Mark::InProgress;
        self.stack.push(i);

        let descriptors = self.descriptors;
        for dependency in descriptors[i].dependencies() {
            let Some(&j) = self.index.get(dependency) else {
                continue;
            };
            match self.marks[j] {
                Mark::InProgress => {
                    let start = self.stack.iter().position(|&k| k == j).unwrap_or(0);
                    let mut cycle: Vec<String> = self.stack[start..]
                        .iter()
                        .map(|&k| descriptors[k].name.clone())
                        .collect();
                    cycle.push(descriptors[j].name.clone());
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = self.visit(j) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        self.stack.pop();
        self.marks[i] = Mark::Done;
        None
    }
}

/// Kahn's algorithm over the included artifacts; ties go to declaration order.
fn topological_order(
    descriptors: &[ArtifactDescriptor],
    index: &HashMap<&str, usize>,
    included: &BTreeSet<usize>,
) -> Result<Vec<usize>, ConfigurationError> {
    let mut pending: HashMap<usize, usize> = HashMap::new();
    let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();

    for &i in included {
        let deps: Vec<usize> = descriptors[i]
            .dependencies()
            .into_iter()
            .filter_map(|name| index.get(name).copied())
            .filter(|j| included.contains(j))
            .collect();
        pending.insert(i, deps.len());
        for j in deps {
            dependents.entry(j).or_default().push(i);
        }
    }

    let mut ready: BTreeSet<usize> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(&i, _)| i)
        .collect();
    let mut order = Vec::with_capacity(included.len());

    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &dependent in dependents.get(&i).into_iter().flatten() {
            if let Some(count) = pending.get_mut(&dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if order.len() != included.len() {
        let stuck = included
            .iter()
            .filter(|i| !order.contains(i))
            .map(|&i| descriptors[i].name.clone())
            .collect();
        return Err(ConfigurationError::Cycle(stuck));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryRegistry;
    use serde_json::json;

    const NETWORK: NetworkId = NetworkId(31337);

    fn reward_token() -> ArtifactDescriptor {
        ArtifactDescriptor::new("RewardToken")
            .arg(Arg::literal("KK"))
            .arg(Arg::literal("KK"))
            .tag("all")
            .tag("RewardToken")
    }

    fn governance() -> ArtifactDescriptor {
        ArtifactDescriptor::new("Governance")
            .arg(Arg::address_of("RewardToken"))
            .tag("all")
            .tag("Governance")
    }

    fn record(name: &str) -> DeploymentRecord {
        DeploymentRecord::new(
            name,
            NETWORK,
            "0x5fbdb2315678afecb367f032d93f642f64180aa3".parse().unwrap(),
            json!([]),
        )
    }

    fn names(plan: &DeploymentPlan) -> Vec<&str> {
        plan.entries
            .iter()
            .map(|entry| entry.descriptor.name.as_str())
            .collect()
    }

    #[test]
    fn test_selection_parsing() {
        let selection: Selection = "RewardToken, Governance,".parse().unwrap();
        assert!(!selection.is_all());
        assert_eq!(selection.to_string(), "Governance,RewardToken");

        let empty: Selection = "".parse().unwrap();
        assert!(empty.is_all());
    }

    #[test]
    fn test_dependencies_come_first() {
        // Declared in reverse order on purpose.
        let descriptors = vec![governance(), reward_token()];
        let plan = DeploymentPlan::build(
            &descriptors,
            &Selection::all(),
            &MemoryRegistry::default(),
            NETWORK,
            false,
        )
        .unwrap();

        assert_eq!(names(&plan), vec!["RewardToken", "Governance"]);
        assert_eq!(plan.to_deploy().count(), 2);
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let descriptors = vec![
            ArtifactDescriptor::new("C"),
            ArtifactDescriptor::new("A"),
            ArtifactDescriptor::new("B").arg(Arg::address_of("C")),
        ];
        let plan = DeploymentPlan::build(
            &descriptors,
            &Selection::all(),
            &MemoryRegistry::default(),
            NETWORK,
            false,
        )
        .unwrap();

        assert_eq!(names(&plan), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_tag_selection_pulls_in_undeployed_dependencies() {
        let descriptors = vec![reward_token(), governance(), ArtifactDescriptor::new("Unrelated")];
        let plan = DeploymentPlan::build(
            &descriptors,
            &"Governance".parse().unwrap(),
            &MemoryRegistry::default(),
            NETWORK,
            false,
        )
        .unwrap();

        assert_eq!(names(&plan), vec!["RewardToken", "Governance"]);
        assert!(!plan.entries[0].selected);
        assert!(plan.entries[1].selected);
    }

    #[test]
    fn test_deployed_dependency_is_not_replanned() {
        let descriptors = vec![reward_token(), governance()];
        let mut registry = MemoryRegistry::default();
        registry.put(record("RewardToken")).unwrap();

        let plan = DeploymentPlan::build(
            &descriptors,
            &"Governance".parse().unwrap(),
            &registry,
            NETWORK,
            true,
        )
        .unwrap();

        // Forcing Governance does not force its recorded dependency.
        assert_eq!(names(&plan), vec!["Governance"]);
        assert_eq!(plan.entries[0].action, PlannedAction::Deploy);
    }

    #[test]
    fn test_recorded_artifacts_are_reused_unless_forced() {
        let descriptors = vec![reward_token(), governance()];
        let mut registry = MemoryRegistry::default();
        registry.put(record("RewardToken")).unwrap();
        registry.put(record("Governance")).unwrap();

        let plan =
            DeploymentPlan::build(&descriptors, &Selection::all(), &registry, NETWORK, false)
                .unwrap();
        assert_eq!(plan.to_deploy().count(), 0);
        assert!(matches!(plan.entries[0].action, PlannedAction::Reuse(_)));

        let forced =
            DeploymentPlan::build(&descriptors, &Selection::all(), &registry, NETWORK, true)
                .unwrap();
        assert_eq!(forced.to_deploy().count(), 2);
    }

    #[test]
    fn test_unknown_selector_is_a_noop() {
        let descriptors = vec![reward_token(), governance()];
        let plan = DeploymentPlan::build(
            &descriptors,
            &"Marketplace".parse().unwrap(),
            &MemoryRegistry::default(),
            NETWORK,
            false,
        )
        .unwrap();

        assert!(plan.is_empty());
    }

    #[test]
    fn test_cycle_is_rejected() {
        let descriptors = vec![
            ArtifactDescriptor::new("A").arg(Arg::address_of("B")),
            ArtifactDescriptor::new("B").arg(Arg::address_of("A")),
        ];

        let err = DeploymentPlan::build(
            &descriptors,
            &Selection::all(),
            &MemoryRegistry::default(),
            NETWORK,
            false,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            OrchestrationError::Configuration(ConfigurationError::Cycle(ref path))
                if path == &vec!["A".to_string(), "B".to_string(), "A".to_string()]
        ));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let descriptors = vec![ArtifactDescriptor::new("A").arg(Arg::address_of("A"))];

        assert!(matches!(
            DeploymentPlan::build(
                &descriptors,
                &Selection::all(),
                &MemoryRegistry::default(),
                NETWORK,
                false,
            ),
            Err(OrchestrationError::Configuration(ConfigurationError::Cycle(_)))
        ));
    }

    #[test]
    fn test_missing_dependency() {
        let descriptors = vec![governance()];

        let err = DeploymentPlan::build(
            &descriptors,
            &Selection::all(),
            &MemoryRegistry::default(),
            NETWORK,
            false,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            OrchestrationError::Configuration(ConfigurationError::MissingDependency {
                ref artifact,
                ref dependency,
            }) if artifact == "Governance" && dependency == "RewardToken"
        ));
    }

    #[test]
    fn test_externally_deployed_dependency_is_accepted() {
        let descriptors = vec![governance()];
        let mut registry = MemoryRegistry::default();
        registry.put(record("RewardToken")).unwrap();

        let plan =
            DeploymentPlan::build(&descriptors, &Selection::all(), &registry, NETWORK, false)
                .unwrap();

        assert_eq!(names(&plan), vec!["Governance"]);
    }

    #[test]
    fn test_duplicate_and_invalid_names() {
        let duplicates = vec![reward_token(), reward_token()];
        assert!(matches!(
            DeploymentPlan::build(
                &duplicates,
                &Selection::all(),
                &MemoryRegistry::default(),
                NETWORK,
                false,
            ),
            Err(OrchestrationError::Configuration(
                ConfigurationError::DuplicateArtifact(_)
            ))
        ));

        let invalid = vec![ArtifactDescriptor::new("../escape")];
        assert!(matches!(
            DeploymentPlan::build(
                &invalid,
                &Selection::all(),
                &MemoryRegistry::default(),
                NETWORK,
                false,
            ),
            Err(OrchestrationError::Configuration(ConfigurationError::InvalidName(_)))
        ));
    }

    #[test]
    fn test_step_output_in_constructor_is_rejected() {
        let descriptors = vec![ArtifactDescriptor::new("A").arg(Arg::output_of("register", 0))];

        assert!(matches!(
            DeploymentPlan::build(
                &descriptors,
                &Selection::all(),
                &MemoryRegistry::default(),
                NETWORK,
                false,
            ),
            Err(OrchestrationError::Configuration(
                ConfigurationError::OutputInConstructor(_)
            ))
        ));
    }
}
