//! Call traces produced by the `callTracer` of `debug_traceBlockByNumber` and
//! `debug_traceTransaction`.

use alloy_primitives::{Address, B256, Bytes, U64, U256};
use serde::{Deserialize, Serialize};

/// Position of a call inside a trace tree: the child index taken at every level,
/// starting from the top-level call (which has an empty address).
pub type TraceAddress = Vec<usize>;

/// One frame of a `callTracer` trace, with its nested sub-calls.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTrace {
    /// Call kind: `CALL`, `STATICCALL`, `DELEGATECALL`, `CREATE`, ...
    #[serde(rename = "type")]
    pub kind: String,
    /// Caller.
    pub from: Address,
    /// Callee, absent for failed creations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    /// Value transferred, absent for static and delegate calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    /// Gas provided to the call.
    #[serde(default)]
    pub gas: U64,
    /// Gas used by the call.
    #[serde(default)]
    pub gas_used: U64,
    /// Call data.
    #[serde(default)]
    pub input: Bytes,
    /// Return data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Bytes>,
    /// Error string if the call reverted or failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Decoded revert reason, when the tracer provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    /// Nested calls, in execution order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<CallTrace>,
}

impl CallTrace {
    /// Creates a frame of the given kind with no sub-calls and every optional field unset.
    pub fn new(kind: impl Into<String>, from: Address) -> Self {
        Self {
            kind: kind.into(),
            from,
            to: None,
            value: None,
            gas: U64::ZERO,
            gas_used: U64::ZERO,
            input: Bytes::new(),
            output: None,
            error: None,
            revert_reason: None,
            calls: Vec::new(),
        }
    }

    /// Flattens the tree into depth-first pre-order `(trace address, call)` pairs.
    ///
    /// Uses an explicit stack, so arbitrarily deep trees do not grow the call stack.
    pub fn flatten(&self) -> Vec<(TraceAddress, &Self)> {
        let mut flat = Vec::new();
        let mut stack: Vec<(TraceAddress, &Self)> = vec![(Vec::new(), self)];

        while let Some((address, call)) = stack.pop() {
            for (index, child) in call.calls.iter().enumerate().rev() {
                let mut child_address = address.clone();
                child_address.push(index);
                stack.push((child_address, child));
            }
            flat.push((address, call));
        }

        flat
    }

    /// Returns the number of frames in the tree, including this one.
    pub fn call_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(call) = stack.pop() {
            count += 1;
            stack.extend(call.calls.iter());
        }
        count
    }

    /// Returns the depth of the deepest frame, where a call without sub-calls has depth 1.
    pub fn max_depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(1, self)];
        while let Some((depth, call)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(call.calls.iter().map(|child| (depth + 1, child)));
        }
        deepest
    }

    /// Returns `true` if this frame carries an error.
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl Drop for CallTrace {
    fn drop(&mut self) {
        // Unlink children one level at a time, so dropping a deep tree does not recurse.
        let mut stack = std::mem::take(&mut self.calls);
        while let Some(mut call) = stack.pop() {
            stack.append(&mut call.calls);
        }
    }
}

/// The trace of one transaction, aligned positionally with the block's transactions.
///
/// `result` is `None` for transactions whose trace is known to be unobtainable from the
/// node; the block is still archived in that case.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceResult {
    /// Hash of the traced transaction. Older nodes omit it from block traces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
    /// The call tree.
    #[serde(default)]
    pub result: Option<CallTrace>,
    /// Tracer error for this transaction, if the node reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceResult {
    /// Creates a [`TraceResult`] for a transaction whose trace could not be produced.
    pub const fn empty(tx_hash: B256) -> Self {
        Self { tx_hash: Some(tx_hash), result: None, error: None }
    }

    /// Creates a [`TraceResult`] wrapping the call tree of a single transaction.
    pub const fn new(tx_hash: B256, result: CallTrace) -> Self {
        Self { tx_hash: Some(tx_hash), result: Some(result), error: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(kind: &str, calls: Vec<CallTrace>) -> CallTrace {
        let mut call = CallTrace::new(kind, Address::ZERO);
        call.calls = calls;
        call
    }

    #[test]
    fn test_flatten_is_depth_first_preorder() {
        // root
        // ├── a
        // │   ├── a0
        // │   └── a1
        // └── b
        let tree = call(
            "CALL",
            vec![
                call("a", vec![call("a0", vec![]), call("a1", vec![])]),
                call("b", vec![]),
            ],
        );

        let flat: Vec<(TraceAddress, &str)> =
            tree.flatten().into_iter().map(|(addr, c)| (addr, c.kind.as_str())).collect();

        assert_eq!(
            flat,
            vec![
                (vec![], "CALL"),
                (vec![0], "a"),
                (vec![0, 0], "a0"),
                (vec![0, 1], "a1"),
                (vec![1], "b"),
            ]
        );
        assert_eq!(tree.call_count(), 5);
        assert_eq!(tree.max_depth(), 3);
    }

    #[test]
    fn test_flatten_deep_tree() {
        let mut tree = call("leaf", vec![]);
        for _ in 0..10_000 {
            tree = call("CALL", vec![tree]);
        }

        let flat = tree.flatten();
        assert_eq!(flat.len(), 10_001);
        assert_eq!(flat.last().unwrap().0.len(), 10_000);
        assert_eq!(tree.max_depth(), 10_001);
    }

    #[test]
    fn test_deep_tree_decodes_past_the_default_recursion_limit() {
        let depth = 1_100;
        let mut raw = String::new();
        for _ in 0..depth {
            raw.push_str(r#"{"type":"CALL","from":"0x0000000000000000000000000000000000000001","calls":["#);
        }
        raw.push_str(r#"{"type":"STOP","from":"0x0000000000000000000000000000000000000002"}"#);
        raw.push_str(&"]}".repeat(depth));

        assert!(serde_json::from_str::<CallTrace>(&raw).is_err());
        let tree: CallTrace = crate::json::from_slice(raw.as_bytes()).unwrap();
        assert_eq!(tree.max_depth(), depth + 1);
        assert_eq!(tree.flatten().last().unwrap().1.kind, "STOP");
    }

    #[test]
    fn test_call_tracer_output_decodes() {
        let raw = json!({
            "txHash": B256::repeat_byte(0x01),
            "result": {
                "type": "CALL",
                "from": "0x0000000000000000000000000000000000000001",
                "to": "0x0000000000000000000000000000000000000002",
                "value": "0x0",
                "gas": "0x5208",
                "gasUsed": "0x5208",
                "input": "0x",
                "calls": [{
                    "type": "STATICCALL",
                    "from": "0x0000000000000000000000000000000000000002",
                    "to": "0x0000000000000000000000000000000000000003",
                    "gas": "0x100",
                    "gasUsed": "0x10",
                    "input": "0x01",
                    "output": "0x02",
                    "error": "execution reverted"
                }]
            }
        });

        let trace: TraceResult = serde_json::from_value(raw).unwrap();
        let root = trace.result.unwrap();
        assert_eq!(root.kind, "CALL");
        assert_eq!(root.value, Some(U256::ZERO));
        assert!(root.calls[0].value.is_none());
        assert!(root.calls[0].is_error());
    }

    #[test]
    fn test_null_result_decodes_as_empty() {
        let trace: TraceResult = serde_json::from_value(json!({ "result": null })).unwrap();
        assert_eq!(trace, TraceResult::default());
    }
}
