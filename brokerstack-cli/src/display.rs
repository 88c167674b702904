//! Terminal rendering of plans, outputs and the dependency graph

use colored::Colorize;

use brokerstack_core::effect::Effect;
use brokerstack_core::graph::DependencyGraph;
use brokerstack_core::plan::Plan;
use brokerstack_core::resolve::BindingMap;
use brokerstack_core::resource::{Resource, State, Value};
use brokerstack_topology::orchestrator::StackOutput;
use brokerstack_topology::Deployment;

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut strs: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            strs.sort();
            format!("{{{}}}", strs.join(", "))
        }
        Value::ResourceRef(binding, attr) => format!("{}.{}", binding, attr),
        Value::Secret(_) => "(sensitive)".to_string(),
    }
}

fn colored_symbol(effect: &Effect) -> colored::ColoredString {
    match effect {
        Effect::Read(_) => effect.symbol().cyan(),
        Effect::Create(_) => effect.symbol().green(),
        Effect::Update { .. } => effect.symbol().yellow(),
        Effect::Replace { .. } => effect.symbol().magenta(),
        Effect::Delete { .. } => effect.symbol().red(),
    }
}

/// Attribute lines shown under one effect
fn effect_details(effect: &Effect) -> Vec<String> {
    match effect {
        Effect::Create(resource) => {
            let mut keys: Vec<_> = resource.attributes.keys().collect();
            keys.sort();
            keys.into_iter()
                .map(|k| format!("{}: {}", k, format_value(&resource.attributes[k])))
                .collect()
        }
        Effect::Update { from, to, .. } => changed_lines(from, to, &[]),
        Effect::Replace {
            from, to, forced_by, ..
        } => changed_lines(from, to, forced_by),
        Effect::Read(_) | Effect::Delete { .. } => Vec::new(),
    }
}

fn changed_lines(from: &State, to: &Resource, forced_by: &[String]) -> Vec<String> {
    let mut keys: Vec<_> = to.attributes.keys().collect();
    keys.sort();
    keys.into_iter()
        .filter_map(|k| {
            let desired = &to.attributes[k];
            let line = match from.attributes.get(k) {
                Some(current) if current.same_as(desired) => return None,
                Some(current) => format!(
                    "{}: {} => {}",
                    k,
                    format_value(current),
                    format_value(desired)
                ),
                None => format!("{}: (none) => {}", k, format_value(desired)),
            };
            if forced_by.contains(k) {
                Some(format!("{} (forces replacement)", line))
            } else {
                Some(line)
            }
        })
        .collect()
}

pub fn print_plan(plan: &Plan, verbose: bool) {
    if plan.has_no_changes() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for (stage, indices) in plan.group_by_stage() {
        let heading = match stage {
            Some(name) => format!("Stage: {}", name),
            None => "Deletions:".to_string(),
        };
        println!("{}", heading.bold());

        for idx in indices {
            let effect = &plan.effects()[idx];
            println!(
                "  {} {} {}",
                colored_symbol(effect),
                effect.resource_id(),
                format!("({})", effect.binding()).dimmed()
            );
            if verbose || matches!(effect, Effect::Update { .. } | Effect::Replace { .. }) {
                for line in effect_details(effect) {
                    println!("      {}", line);
                }
            }
        }
        println!();
    }

    println!("{}", plan.summary().to_string().bold());
}

pub fn print_outputs(outputs: &[StackOutput], bindings: &BindingMap) {
    println!("{}", "Outputs:".cyan().bold());
    for output in outputs {
        let value = match output.value.resolve(bindings) {
            Some(v) => v.normal(),
            None => format!("{} (known after apply)", output.value).dimmed(),
        };
        println!("  {} = {}", output.name.bold(), value);
        println!("      {}", output.description.dimmed());
    }
}

/// Stage order followed by every resource with its outgoing edges
pub fn print_graph(deployment: &Deployment) {
    let graph = DependencyGraph::from_resources(&deployment.resources);

    println!("{}", "Stages:".cyan().bold());
    println!("  {}", deployment.stage_names().join(" -> "));
    println!();

    for name in deployment.stage_names() {
        println!("{}", format!("Stage: {}", name).bold());
        for binding in deployment.stage_bindings(name) {
            println!("  {}", binding);
            let mut deps: Vec<String> = graph
                .dependencies_of(binding)
                .iter()
                .map(|d| {
                    if d.attribute.is_empty() {
                        format!("{} (explicit)", d.target)
                    } else {
                        format!("{}.{} via {}", d.target, d.attribute, d.used_in)
                    }
                })
                .collect();
            deps.sort();
            deps.dedup();
            for dep in deps {
                println!("    {} {}", "<-".dimmed(), dep);
            }
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brokerstack_core::effect::ReplaceOrder;
    use brokerstack_core::resource::ResourceId;
    use std::collections::HashMap;

    #[test]
    fn secrets_are_masked() {
        let env = Value::List(vec![Value::Map(HashMap::from([
            ("name".to_string(), Value::from("SLSDEBUG_LICENSE_KEY")),
            ("value".to_string(), Value::Secret("abc-123".to_string())),
        ]))]);
        let rendered = format_value(&env);
        assert!(rendered.contains("(sensitive)"));
        assert!(!rendered.contains("abc-123"));
    }

    #[test]
    fn update_lists_only_changed_attributes() {
        let id = ResourceId::new("elbv2.target_group", "slsd-in-elb-clt-tg-dev");
        let from = State::existing(
            id.clone(),
            HashMap::from([
                ("port".to_string(), Value::Int(5555)),
                ("health_check_path".to_string(), Value::from("/")),
            ]),
        );
        let to = Resource::new("elbv2.target_group", "slsd-in-elb-clt-tg-dev")
            .with_attribute("port", 5555i64)
            .with_attribute("health_check_path", "/health");

        let lines = effect_details(&Effect::Update { id, from, to });
        assert_eq!(lines, vec!["health_check_path: \"/\" => \"/health\""]);
    }

    #[test]
    fn replacement_marks_the_attributes_that_force_it() {
        let id = ResourceId::new("ec2.security_group", "slsd-ex-elb-sg-dev");
        let from = State::existing(
            id.clone(),
            HashMap::from([("vpc_id".to_string(), Value::from("vpc-1"))]),
        );
        let to = Resource::new("ec2.security_group", "slsd-ex-elb-sg-dev")
            .with_attribute("vpc_id", Value::reference("vpc", "id"));

        let effect = Effect::Replace {
            id,
            from,
            to,
            forced_by: vec!["vpc_id".to_string()],
            order: ReplaceOrder::DeleteFirst,
        };
        assert_eq!(
            effect_details(&effect),
            vec!["vpc_id: \"vpc-1\" => vpc.id (forces replacement)"]
        );
    }
}
