//! Prometheus text exposition format.
//!
//! Renders the latest fleet snapshot as gauges labelled by node id for
//! scraping by a Prometheus server or compatible agent.

use crate::types::{FleetSnapshot, NodeTelemetrySnapshot};

/// Render every node of `snapshot` into Prometheus text format.
pub fn render_prometheus(snapshot: &FleetSnapshot) -> String {
    let mut out = String::new();

    gauge(
        &mut out,
        snapshot,
        "fleetpanel_node_online",
        "Whether the node reported live telemetry (1) or not (0).",
        |n| u8::from(n.online).to_string(),
    );
    gauge(
        &mut out,
        snapshot,
        "fleetpanel_node_cpu_usage_percent",
        "Summed absolute CPU usage of the node's workloads.",
        |n| format!("{:.2}", n.cpu.usage_percent),
    );
    gauge(
        &mut out,
        snapshot,
        "fleetpanel_node_memory_used_bytes",
        "Memory used by the node's workloads in bytes.",
        |n| n.memory.used_bytes.to_string(),
    );
    gauge(
        &mut out,
        snapshot,
        "fleetpanel_node_memory_total_bytes",
        "Configured memory limit of the node in bytes.",
        |n| n.memory.total_bytes.to_string(),
    );
    gauge(
        &mut out,
        snapshot,
        "fleetpanel_node_disk_used_bytes",
        "Disk used by the node's workloads in bytes.",
        |n| n.disk.used_bytes.to_string(),
    );
    gauge(
        &mut out,
        snapshot,
        "fleetpanel_node_disk_total_bytes",
        "Disk budgeted to the node's workloads in bytes.",
        |n| n.disk.total_bytes.to_string(),
    );

    out.push_str("# HELP fleetpanel_poll_cycle Number of the last published poll cycle.\n");
    out.push_str("# TYPE fleetpanel_poll_cycle counter\n");
    out.push_str(&format!("fleetpanel_poll_cycle {}\n", snapshot.cycle));

    out
}

fn gauge(
    out: &mut String,
    snapshot: &FleetSnapshot,
    name: &str,
    help: &str,
    value: impl Fn(&NodeTelemetrySnapshot) -> String,
) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} gauge\n"));
    for node in snapshot.iter() {
        out.push_str(&format!(
            "{name}{{node=\"{}\",name=\"{}\"}} {}\n",
            node.node_id,
            escape_label(&node.name),
            value(node)
        ));
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
