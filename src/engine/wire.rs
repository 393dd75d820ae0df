use crate::engine::elements;
use crate::engine::state::EngineState;
use crate::error::ConfigError;
use crate::store::{parse_name, VarStore};
use serde_json::Value;

/// Element-type names that terminate a rung as its sink.
const COIL_TYPES: [&str; 4] = ["Coil", "OneShotPositiveCoil", "SetCoil", "ResetCoil"];

/// One node of a wire tree: a leaf operator or a two-way parallel
/// branch whose truth values OR together.
#[derive(Debug, Clone)]
pub enum WireNode {
    Element {
        element_type: String,
        args: Vec<String>,
    },
    Branch {
        left: Vec<WireNode>,
        right: Vec<WireNode>,
    },
}

/// A parsed rung. Every scan task owns a deep copy of its wire.
#[derive(Debug, Clone)]
pub struct Wire {
    pub nodes: Vec<WireNode>,
}

impl Wire {
    /// Parse one entry of the document's `Wires` array.
    pub fn from_json(wire: &Value) -> Result<Self, ConfigError> {
        let nodes = wire
            .get("Nodes")
            .and_then(Value::as_array)
            .ok_or_else(|| ConfigError::Structure("wire without Nodes array".into()))?;
        Ok(Self {
            nodes: parse_nodes(nodes)?,
        })
    }

    /// Check that every variable name this wire references resolves in
    /// the store. Unknown element types carry no checkable contract and
    /// are skipped (they scan as no-ops).
    pub fn validate(&self, store: &VarStore) -> Result<(), ConfigError> {
        validate_nodes(&self.nodes, store)
    }
}

fn parse_nodes(nodes: &[Value]) -> Result<Vec<WireNode>, ConfigError> {
    nodes.iter().map(parse_node).collect()
}

fn parse_node(node: &Value) -> Result<WireNode, ConfigError> {
    let node_type = node
        .get("Type")
        .and_then(Value::as_str)
        .ok_or_else(|| ConfigError::Structure("node without Type".into()))?;

    match node_type {
        "LadderElement" => {
            let element_type = node
                .get("ElementType")
                .and_then(Value::as_str)
                .ok_or_else(|| ConfigError::Structure("LadderElement without ElementType".into()))?
                .to_string();
            let args = node
                .get("ComboBoxValues")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    ConfigError::Structure("LadderElement without ComboBoxValues".into())
                })?
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            Ok(WireNode::Element { element_type, args })
        }
        "Branch" => {
            let left = node
                .get("Nodes1")
                .and_then(Value::as_array)
                .ok_or_else(|| ConfigError::Structure("Branch without Nodes1".into()))?;
            let right = node
                .get("Nodes2")
                .and_then(Value::as_array)
                .ok_or_else(|| ConfigError::Structure("Branch without Nodes2".into()))?;
            Ok(WireNode::Branch {
                left: parse_nodes(left)?,
                right: parse_nodes(right)?,
            })
        }
        other => Err(ConfigError::Structure(format!("unknown node type '{other}'"))),
    }
}

/// Required argument count of each known element type.
fn required_args(element_type: &str) -> Option<usize> {
    match element_type {
        "NOContact" | "NCContact" | "Coil" | "OneShotPositiveCoil" | "SetCoil" | "ResetCoil"
        | "CountUp" | "CountDown" | "OnDelayTimer" | "OffDelayTimer" | "Reset" => Some(1),
        "GreaterCompare" | "LessCompare" | "GreaterOrEqualCompare" | "LessOrEqualCompare"
        | "EqualCompare" | "NotEqualCompare" | "MoveMath" => Some(2),
        "AddMath" | "SubtractMath" | "MultiplyMath" | "DivideMath" => Some(3),
        _ => None,
    }
}

fn validate_nodes(nodes: &[WireNode], store: &VarStore) -> Result<(), ConfigError> {
    for node in nodes {
        match node {
            WireNode::Element { element_type, args } => {
                let Some(count) = required_args(element_type) else {
                    continue;
                };
                if args.len() < count {
                    return Err(ConfigError::Structure(format!(
                        "{element_type} needs {count} arguments, got {}",
                        args.len()
                    )));
                }
                for arg in &args[..count] {
                    let (base, _) = parse_name(arg);
                    if store.find(base).is_none() {
                        return Err(ConfigError::UnknownVariable(arg.clone()));
                    }
                }
            }
            WireNode::Branch { left, right } => {
                validate_nodes(left, store)?;
                validate_nodes(right, store)?;
            }
        }
    }
    Ok(())
}

fn is_coil(node: &WireNode) -> bool {
    matches!(node, WireNode::Element { element_type, .. }
        if COIL_TYPES.contains(&element_type.as_str()))
}

/// One full scan pass over a wire: series evaluation left to right,
/// trailing coil fired with the final condition.
pub fn scan_wire(wire: &Wire, store: &VarStore, state: &EngineState) {
    let mut condition = true;
    let mut last_coil = None;
    process_nodes(&wire.nodes, &mut condition, &mut last_coil, store, state);
    if let Some(coil) = last_coil {
        process_coil(coil, condition, store, state);
    }
}

/// Evaluate a node list, splitting off a trailing coil if present.
/// Returns the final series condition (false for an empty list).
fn process_nodes<'a>(
    nodes: &'a [WireNode],
    condition: &mut bool,
    last_coil: &mut Option<&'a WireNode>,
    store: &VarStore,
    state: &EngineState,
) -> bool {
    *last_coil = None;
    if nodes.is_empty() {
        return false;
    }

    let mut series = nodes;
    if let Some((last, rest)) = nodes.split_last() {
        if is_coil(last) {
            *last_coil = Some(last);
            series = rest;
        }
    }

    let mut all_met = *condition;
    for node in series {
        all_met = process_node(node, all_met, store, state);
    }
    *condition = all_met;
    all_met
}

fn process_node(node: &WireNode, condition: bool, store: &VarStore, state: &EngineState) -> bool {
    match node {
        WireNode::Element { element_type, args } => {
            process_element(element_type, args, condition, store, state)
        }
        WireNode::Branch { left, right } => {
            // both sides evaluate independently from true, then OR
            let mut left_cond = true;
            let mut right_cond = true;
            let mut left_coil = None;
            let mut right_coil = None;

            let left_active = process_nodes(left, &mut left_cond, &mut left_coil, store, state);
            let right_active = process_nodes(right, &mut right_cond, &mut right_coil, store, state);

            let branch_condition = left_active || right_active;

            // coils normally live at the rung tail; inside a branch they
            // run against the branch-local condition
            if let Some(coil) = left_coil {
                if left_cond {
                    tracing::warn!("[WireScan] unexpected coil in branch");
                    process_coil(coil, left_cond, store, state);
                }
            }
            if let Some(coil) = right_coil {
                if right_cond {
                    tracing::warn!("[WireScan] unexpected coil in branch");
                    process_coil(coil, right_cond, store, state);
                }
            }

            condition && branch_condition
        }
    }
}

fn process_element(
    element_type: &str,
    args: &[String],
    condition: bool,
    store: &VarStore,
    state: &EngineState,
) -> bool {
    let Some(count) = required_args(element_type) else {
        tracing::warn!("[WireScan] unknown element type: {element_type}");
        return condition;
    };
    if args.len() < count {
        tracing::warn!("[WireScan] {element_type} missing arguments");
        return condition;
    }
    let a = args[0].as_str();

    match element_type {
        "NOContact" => condition && elements::no_contact(store, a),
        "NCContact" => condition && elements::nc_contact(store, a),
        "GreaterCompare" => condition && elements::greater(store, a, &args[1]),
        "LessCompare" => condition && elements::less(store, a, &args[1]),
        "GreaterOrEqualCompare" => condition && elements::greater_or_equal(store, a, &args[1]),
        "LessOrEqualCompare" => condition && elements::less_or_equal(store, a, &args[1]),
        "EqualCompare" => condition && elements::equal(store, a, &args[1]),
        "NotEqualCompare" => condition && elements::not_equal(store, a, &args[1]),
        "AddMath" => {
            elements::add(store, state, a, &args[1], &args[2], condition);
            condition
        }
        "SubtractMath" => {
            elements::subtract(store, state, a, &args[1], &args[2], condition);
            condition
        }
        "MultiplyMath" => {
            elements::multiply(store, state, a, &args[1], &args[2], condition);
            condition
        }
        "DivideMath" => {
            elements::divide(store, state, a, &args[1], &args[2], condition);
            condition
        }
        "MoveMath" => {
            elements::move_num(store, a, &args[1], condition);
            condition
        }
        "CountUp" => {
            elements::count_up(store, state, a, condition);
            condition
        }
        "CountDown" => {
            elements::count_down(store, state, a, condition);
            condition
        }
        "OnDelayTimer" => condition && elements::timer_on(store, state, a, condition),
        // the off-delay timer overwrites the running condition instead
        // of ANDing into it
        "OffDelayTimer" => elements::timer_off(store, state, a, condition),
        "Reset" => {
            elements::reset(store, state, a, condition);
            condition
        }
        // a coil mid-series feeds nothing; the trailing-coil split
        // already consumed the real sink
        _ => condition,
    }
}

fn process_coil(node: &WireNode, condition: bool, store: &VarStore, state: &EngineState) {
    let WireNode::Element { element_type, args } = node else {
        return;
    };
    let Some(name) = args.first() else {
        tracing::error!("[WireScan] coil missing variable name");
        return;
    };

    match element_type.as_str() {
        "Coil" => elements::coil(store, name, condition),
        "OneShotPositiveCoil" => elements::one_shot_positive_coil(store, state, name, condition),
        "SetCoil" => elements::set_coil(store, name, condition),
        "ResetCoil" => elements::reset_coil(store, name, condition),
        other => tracing::warn!("[WireScan] unknown coil type: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::drivers::NullDrivers;
    use crate::device::PinMap;
    use serde_json::json;
    use std::sync::Arc;

    fn store(vars: serde_json::Value) -> VarStore {
        VarStore::load(
            vars.as_array().unwrap(),
            Arc::new(PinMap::default()),
            Arc::new(NullDrivers),
        )
        .unwrap()
    }

    fn element(element_type: &str, args: &[&str]) -> Value {
        json!({
            "Type": "LadderElement",
            "ElementType": element_type,
            "ComboBoxValues": args,
        })
    }

    #[test]
    fn parses_elements_and_branches() {
        let wire = Wire::from_json(&json!({
            "Nodes": [
                {"Type": "Branch",
                 "Nodes1": [element("NOContact", &["a"])],
                 "Nodes2": [element("NCContact", &["b"])]},
                element("Coil", &["out"]),
            ]
        }))
        .unwrap();
        assert_eq!(wire.nodes.len(), 2);
        assert!(matches!(wire.nodes[0], WireNode::Branch { .. }));
    }

    #[test]
    fn rejects_malformed_nodes() {
        assert!(Wire::from_json(&json!({"Nodes": "not an array"})).is_err());
        assert!(Wire::from_json(&json!({
            "Nodes": [{"Type": "LadderElement"}]
        }))
        .is_err());
        assert!(Wire::from_json(&json!({
            "Nodes": [{"Type": "Mystery"}]
        }))
        .is_err());
    }

    #[test]
    fn validation_requires_resolvable_names() {
        let s = store(json!([
            {"Type": "Boolean", "Name": "a", "Value": false},
            {"Type": "Boolean", "Name": "out", "Value": false},
        ]));
        let good = Wire::from_json(&json!({
            "Nodes": [element("NOContact", &["a"]), element("Coil", &["out"])]
        }))
        .unwrap();
        assert!(good.validate(&s).is_ok());

        let bad = Wire::from_json(&json!({
            "Nodes": [element("NOContact", &["ghost"]), element("Coil", &["out"])]
        }))
        .unwrap();
        assert!(matches!(
            bad.validate(&s),
            Err(ConfigError::UnknownVariable(_))
        ));
    }

    #[test]
    fn validation_accepts_dotted_subfields() {
        let s = store(json!([
            {"Type": "Counter", "Name": "c", "PV": 1.0, "CV": 0.0},
            {"Type": "Boolean", "Name": "out", "Value": false},
        ]));
        let wire = Wire::from_json(&json!({
            "Nodes": [element("NCContact", &["c.QU"]), element("Coil", &["out"])]
        }))
        .unwrap();
        assert!(wire.validate(&s).is_ok());
    }

    #[test]
    fn series_scan_drives_trailing_coil() {
        let s = store(json!([
            {"Type": "Boolean", "Name": "a", "Value": false},
            {"Type": "Boolean", "Name": "out", "Value": false},
        ]));
        let state = EngineState::new();
        // NO-contact polarity: a=false reads as active
        let wire = Wire::from_json(&json!({
            "Nodes": [element("NOContact", &["a"]), element("Coil", &["out"])]
        }))
        .unwrap();
        scan_wire(&wire, &s, &state);
        assert!(s.read_bool("out"));

        s.write_bool("a", true);
        scan_wire(&wire, &s, &state);
        assert!(!s.read_bool("out"));
    }

    #[test]
    fn branch_ors_both_sides() {
        let s = store(json!([
            {"Type": "Boolean", "Name": "a", "Value": true},
            {"Type": "Boolean", "Name": "b", "Value": false},
            {"Type": "Boolean", "Name": "out", "Value": false},
        ]));
        let state = EngineState::new();
        let wire = Wire::from_json(&json!({
            "Nodes": [
                {"Type": "Branch",
                 "Nodes1": [element("NOContact", &["a"])],
                 "Nodes2": [element("NOContact", &["b"])]},
                element("Coil", &["out"]),
            ]
        }))
        .unwrap();
        // a=true → left inactive; b=false → right active; OR = true
        scan_wire(&wire, &s, &state);
        assert!(s.read_bool("out"));

        s.write_bool("b", true);
        scan_wire(&wire, &s, &state);
        assert!(!s.read_bool("out"));
    }

    #[test]
    fn unknown_elements_scan_as_no_ops() {
        let s = store(json!([
            {"Type": "Boolean", "Name": "out", "Value": false},
        ]));
        let state = EngineState::new();
        let wire = Wire::from_json(&json!({
            "Nodes": [element("FuzzBox", &["x"]), element("Coil", &["out"])]
        }))
        .unwrap();
        // unknown element leaves the condition alone
        scan_wire(&wire, &s, &state);
        assert!(s.read_bool("out"));
    }

    #[test]
    fn empty_wire_scans_without_effect() {
        let s = store(json!([]));
        let state = EngineState::new();
        let wire = Wire::from_json(&json!({"Nodes": []})).unwrap();
        scan_wire(&wire, &s, &state);
    }
}
