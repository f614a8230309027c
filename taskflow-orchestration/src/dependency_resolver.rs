//! Dependency Resolver: validates a task template's step DAG is
//! acyclic and materializes its `StepEdge` rows for a new `Task` instance.

use std::collections::{HashMap, HashSet};
use taskflow_shared::error::CoreError;
use uuid::Uuid;

/// One step's declared dependencies, named by step name within the owning
/// template (not yet resolved to `WorkflowStep` uuids).
#[derive(Debug, Clone)]
pub struct StepDependencySpec {
    pub step_name: String,
    pub depends_on: Vec<String>,
}

/// A validated, acyclic step DAG, ready to have its edges persisted once the
/// concrete `WorkflowStep` rows exist.
#[derive(Debug, Clone)]
pub struct ResolvedDag {
    /// Step names in a valid topological order.
    pub topological_order: Vec<String>,
    /// `(from_step_name, to_step_name)` edges, `to` depends on `from`.
    pub edges: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    /// Validate `specs` form a DAG and return a
    /// topological ordering plus the flattened edge list. Rejects both
    /// cycles and dependencies on undeclared step names.
    pub fn resolve(specs: &[StepDependencySpec]) -> Result<ResolvedDag, CoreError> {
        let names: HashSet<&str> = specs.iter().map(|s| s.step_name.as_str()).collect();

        for spec in specs {
            for dep in &spec.depends_on {
                if !names.contains(dep.as_str()) {
                    return Err(CoreError::Validation {
                        entity: "step_dependency_spec".to_string(),
                        reason: format!(
                            "step '{}' depends on undeclared step '{}'",
                            spec.step_name, dep
                        ),
                    });
                }
            }
        }

        let mut in_degree: HashMap<&str, usize> =
            specs.iter().map(|s| (s.step_name.as_str(), s.depends_on.len())).collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for spec in specs {
            for dep in &spec.depends_on {
                dependents.entry(dep.as_str()).or_default().push(spec.step_name.as_str());
            }
        }

        let mut ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&name, _)| name)
            .collect();
        ready.sort_unstable();

        let mut order = Vec::with_capacity(specs.len());
        while let Some(name) = ready.pop() {
            order.push(name.to_string());
            if let Some(children) = dependents.get(name) {
                let mut newly_ready = Vec::new();
                for &child in children {
                    let deg = in_degree.get_mut(child).expect("dependent must be declared");
                    *deg -= 1;
                    if *deg == 0 {
                        newly_ready.push(child);
                    }
                }
                newly_ready.sort_unstable();
                ready.extend(newly_ready);
            }
        }

        if order.len() != specs.len() {
            return Err(CoreError::Validation {
                entity: "step_dependency_spec".to_string(),
                reason: "step dependency graph contains a cycle".to_string(),
            });
        }

        let edges = specs
            .iter()
            .flat_map(|spec| {
                spec.depends_on
                    .iter()
                    .map(move |dep| (dep.clone(), spec.step_name.clone()))
            })
            .collect();

        Ok(ResolvedDag {
            topological_order: order,
            edges,
        })
    }
}

/// Persist a resolved DAG's edges once `name -> uuid` is known for every
/// step in the task instance. Takes a live connection (typically a
/// transaction) rather than a pool so this folds into the caller's
/// single-transaction task-creation invariant instead of racing it.
pub async fn persist_edges(
    conn: &mut sqlx::PgConnection,
    task_uuid: Uuid,
    dag: &ResolvedDag,
    step_uuids_by_name: &HashMap<String, Uuid>,
) -> Result<(), CoreError> {
    for (from_name, to_name) in &dag.edges {
        let from_uuid = step_uuids_by_name
            .get(from_name)
            .copied()
            .ok_or_else(|| CoreError::Validation {
                entity: "step_dependency_spec".to_string(),
                reason: format!("no workflow_step for step name '{from_name}'"),
            })?;
        let to_uuid = step_uuids_by_name
            .get(to_name)
            .copied()
            .ok_or_else(|| CoreError::Validation {
                entity: "step_dependency_spec".to_string(),
                reason: format!("no workflow_step for step name '{to_name}'"),
            })?;

        sqlx::query(
            "INSERT INTO step_edges (task_uuid, from_step_uuid, to_step_uuid) VALUES ($1, $2, $3)",
        )
        .bind(task_uuid)
        .bind(from_uuid)
        .bind(to_uuid)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, deps: &[&str]) -> StepDependencySpec {
        StepDependencySpec {
            step_name: name.to_string(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn linear_chain_resolves_in_order() {
        let specs = vec![spec("a", &[]), spec("b", &["a"]), spec("c", &["b"])];
        let dag = DependencyResolver::resolve(&specs).unwrap();
        assert_eq!(dag.topological_order, vec!["a", "b", "c"]);
    }

    #[test]
    fn diamond_resolves_with_join_last() {
        let specs = vec![
            spec("a", &[]),
            spec("b", &["a"]),
            spec("c", &["a"]),
            spec("d", &["b", "c"]),
        ];
        let dag = DependencyResolver::resolve(&specs).unwrap();
        assert_eq!(dag.topological_order.last().unwrap(), "d");
        assert_eq!(dag.topological_order.first().unwrap(), "a");
    }

    #[test]
    fn cycle_is_rejected() {
        let specs = vec![spec("a", &["b"]), spec("b", &["a"])];
        let err = DependencyResolver::resolve(&specs);
        assert!(err.is_err());
    }

    #[test]
    fn dependency_on_undeclared_step_is_rejected() {
        let specs = vec![spec("a", &["ghost"])];
        let err = DependencyResolver::resolve(&specs);
        assert!(err.is_err());
    }
}
