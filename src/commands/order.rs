use super::LoadedConfig;
use crate::output::UserOutput;
use serde_json::json;

/// Print units in initialization order, grouped into the layers `up` would
/// run concurrently.
pub fn run_order(loaded: &LoadedConfig, json: bool, out: &dyn UserOutput) -> anyhow::Result<()> {
    let config = &loaded.config;
    config.validate()?;

    let graph = config.dependency_graph()?;
    let order = graph.topological_sort()?;
    let groups = graph.parallel_groups_of(&order)?;

    if json {
        let doc = json!({
            "order": order,
            "groups": groups,
        });
        out.status(&serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    if order.is_empty() {
        out.status("No units configured");
        return Ok(());
    }

    out.status("Initialization order:");
    for (index, name) in order.iter().enumerate() {
        let deps = graph.direct_dependencies(name);
        if deps.is_empty() {
            out.status(&format!("  {}. {}", index + 1, name));
        } else {
            out.status(&format!("  {}. {} (after {})", index + 1, name, deps.join(", ")));
        }
    }

    out.blank();
    out.status("Parallel groups:");
    for (index, group) in groups.iter().enumerate() {
        out.status(&format!("  {}: {}", index + 1, group.join(", ")));
    }
    Ok(())
}
