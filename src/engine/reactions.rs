// src/engine/reactions.rs

//! Setup reactions: which new rules an event makes necessary.
//!
//! Reactions are plain functions keyed by nothing but the event they are
//! handed; a reaction that does not care about an event returns no rules.

use std::fmt;

use crate::dag::DependencyGraph;
use crate::engine::events::TaskEvent;
use crate::engine::rules::{
    CreateContainerStepRule, RunMainContainerStepRule, StartContainerStepRule, StepRule,
    WaitForHealthyStepRule,
};

/// What a reaction may look at besides the event itself.
pub struct ReactionContext<'a> {
    pub graph: &'a DependencyGraph,
}

pub type Reaction = fn(&TaskEvent, &ReactionContext<'_>) -> Vec<StepRule>;

#[derive(Clone)]
pub struct ReactionRegistry {
    reactions: Vec<Reaction>,
}

impl fmt::Debug for ReactionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactionRegistry")
            .field("reactions", &self.reactions.len())
            .finish()
    }
}

impl Default for ReactionRegistry {
    fn default() -> Self {
        Self {
            reactions: vec![create_container_once_image_ready, start_container_once_created],
        }
    }
}

impl ReactionRegistry {
    pub fn empty() -> Self {
        Self {
            reactions: Vec::new(),
        }
    }

    pub fn register(&mut self, reaction: Reaction) {
        self.reactions.push(reaction);
    }

    pub fn react(&self, event: &TaskEvent, ctx: &ReactionContext<'_>) -> Vec<StepRule> {
        self.reactions
            .iter()
            .flat_map(|reaction| reaction(event, ctx))
            .collect()
    }
}

/// `ImageBuilt` / `ImagePulled` → create the container with that image.
pub fn create_container_once_image_ready(
    event: &TaskEvent,
    ctx: &ReactionContext<'_>,
) -> Vec<StepRule> {
    let (TaskEvent::ImageBuilt { container, image } | TaskEvent::ImagePulled { container, image }) =
        event
    else {
        return Vec::new();
    };

    let Some(node) = ctx.graph.node_for(container) else {
        return Vec::new();
    };

    vec![
        CreateContainerStepRule {
            container: node.container().clone(),
            image: image.clone(),
            dependencies: node.depends_on().clone(),
        }
        .into(),
    ]
}

/// `ContainerCreated` → start and wait for a dependency, or run the main
/// container.
pub fn start_container_once_created(
    event: &TaskEvent,
    ctx: &ReactionContext<'_>,
) -> Vec<StepRule> {
    let TaskEvent::ContainerCreated { container, handle } = event else {
        return Vec::new();
    };

    let Some(node) = ctx.graph.node_for(container) else {
        return Vec::new();
    };

    if node.is_root() {
        return vec![
            RunMainContainerStepRule {
                container: container.clone(),
                handle: handle.clone(),
                dependencies: node.depends_on().clone(),
            }
            .into(),
        ];
    }

    vec![
        StartContainerStepRule {
            container: container.clone(),
            handle: handle.clone(),
            dependencies: node.depends_on().clone(),
        }
        .into(),
        WaitForHealthyStepRule {
            container: container.clone(),
            handle: handle.clone(),
        }
        .into(),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::dag::{Container, Task};
    use crate::types::{ContainerHandle, ImageRef};

    fn graph() -> DependencyGraph {
        let containers: BTreeMap<_, _> = [
            Container::from_image("db", "postgres"),
            Container::from_build_directory("api", "api").depends_on(["db"]),
        ]
        .into_iter()
        .map(|c| (c.name.clone(), c))
        .collect();

        DependencyGraph::build(&Task::new("test", "api"), &containers).expect("graph")
    }

    #[test]
    fn pulled_image_schedules_container_creation() {
        let graph = graph();
        let ctx = ReactionContext { graph: &graph };
        let event = TaskEvent::ImagePulled {
            container: "db".to_string(),
            image: ImageRef("postgres".to_string()),
        };

        let rules = ReactionRegistry::default().react(&event, &ctx);

        assert_eq!(rules.len(), 1);
        assert!(matches!(&rules[0], StepRule::CreateContainer(rule) if rule.container.name == "db"));
    }

    #[test]
    fn created_dependency_is_started_and_awaited() {
        let graph = graph();
        let ctx = ReactionContext { graph: &graph };
        let event = TaskEvent::ContainerCreated {
            container: "db".to_string(),
            handle: ContainerHandle("c-db".to_string()),
        };

        let rules = ReactionRegistry::default().react(&event, &ctx);

        assert_eq!(rules.len(), 2);
        assert!(matches!(&rules[0], StepRule::StartContainer(_)));
        assert!(matches!(&rules[1], StepRule::WaitForHealthy(_)));
    }

    #[test]
    fn created_main_container_is_run() {
        let graph = graph();
        let ctx = ReactionContext { graph: &graph };
        let event = TaskEvent::ContainerCreated {
            container: "api".to_string(),
            handle: ContainerHandle("c-api".to_string()),
        };

        let rules = ReactionRegistry::default().react(&event, &ctx);

        assert_eq!(rules.len(), 1);
        match &rules[0] {
            StepRule::RunMainContainer(rule) => {
                assert!(rule.dependencies.contains("db"));
            }
            other => panic!("unexpected rule {other}"),
        }
    }

    #[test]
    fn unrelated_events_produce_nothing() {
        let graph = graph();
        let ctx = ReactionContext { graph: &graph };

        assert!(ReactionRegistry::default()
            .react(&TaskEvent::NetworkDeleted, &ctx)
            .is_empty());
        assert!(ReactionRegistry::empty()
            .react(
                &TaskEvent::ContainerCreated {
                    container: "db".to_string(),
                    handle: ContainerHandle("c-db".to_string()),
                },
                &ctx,
            )
            .is_empty());
    }
}
