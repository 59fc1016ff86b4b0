mod common;

use std::sync::{Arc, Mutex};

use chainflow::{ChainError, ChannelEvent, ChannelOptions, Config, DbCollection, EngineBuilder, RunStatus, SuspendParam, Vars, WorkflowModel, query::Query};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use common::*;

fn linear() -> Value {
    json!({
        "id": "linear",
        "name": "Linear",
        "nodes": [
            {"id": "s", "type": "start"},
            {"id": "t1", "type": "trail"},
            {"id": "t2", "type": "trail"},
            {"id": "e", "type": "end"}
        ],
        "edges": [
            {"source": "s", "target": "t1"},
            {"source": "t1", "target": "t2"},
            {"source": "t2", "target": "e"}
        ]
    })
}

fn approval() -> Value {
    json!({
        "id": "approval",
        "nodes": [
            {"id": "s", "type": "start"},
            {"id": "h", "type": "human_confirm", "data": {"confirmParameters": [{"name": "approved", "type": "boolean", "required": true}]}},
            {"id": "t", "type": "trail"},
            {"id": "e", "type": "end"}
        ],
        "edges": [
            {"source": "s", "target": "h"},
            {"source": "h", "target": "t"},
            {"source": "t", "target": "e"}
        ]
    })
}

fn branching() -> Value {
    json!({
        "id": "branching",
        "nodes": [
            {"id": "s", "type": "start"},
            {"id": "t0", "type": "trail"},
            {"id": "c", "type": "condition", "data": {"cases": [{"name": "approved", "expression": "${decision} == yes"}]}},
            {"id": "yes", "type": "trail"},
            {"id": "no", "type": "trail"},
            {"id": "e", "type": "end"}
        ],
        "edges": [
            {"source": "s", "target": "t0"},
            {"source": "t0", "target": "c"},
            {"source": "c", "target": "yes", "condition": "approved"},
            {"source": "c", "target": "no"},
            {"source": "yes", "target": "e"},
            {"source": "no", "target": "e"}
        ]
    })
}

fn single(
    id: &str,
    node: Value,
) -> Value {
    json!({
        "id": id,
        "nodes": [
            {"id": "s", "type": "start"},
            node,
            {"id": "t", "type": "trail"},
            {"id": "e", "type": "end"}
        ],
        "edges": [
            {"source": "s", "target": "n"},
            {"source": "n", "target": "t"},
            {"source": "t", "target": "e"}
        ]
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn test_linear_run_completes() {
    let engine = engine();
    let id = deploy(&engine, linear());

    let execute_id = engine.execute_async(&id, Vars::new().with("q", "hi"), "alice").unwrap();
    let info = wait_settled(&engine, &execute_id).await;

    assert_eq!(info.status, RunStatus::Completed);
    assert_eq!(trail(&info), vec!["t1", "t2"]);
    assert_eq!(info.result.as_ref().and_then(|r| r.get::<String>("q")), Some("hi".to_string()));
    assert_eq!(info.nodes.len(), 4);
    assert!(info.nodes.values().all(|n| n.status == RunStatus::Completed));
    // start passes the run input through
    assert_eq!(info.nodes["s"].result, Some(Vars::new().with("q", "hi")));

    let store = engine.store();
    let record = store.get_execution_record_by_key(&execute_id).unwrap().unwrap();
    assert_eq!(record.status, "completed");
    assert_eq!(record.workflow_id, "linear");
    assert_eq!(record.title, "Linear");
    assert_eq!(record.created_by, "alice");
    assert!(record.end_time > 0);

    let steps = store.get_steps_by_key(&execute_id).unwrap();
    let order = steps.iter().map(|s| (s.seq, s.node_id.as_str())).collect::<Vec<_>>();
    assert_eq!(order, vec![(1, "s"), (2, "t1"), (3, "t2"), (4, "e")]);
    assert!(steps.iter().all(|s| s.status == "completed"));
    assert_eq!(serde_json::from_str::<Value>(&steps[0].output).unwrap(), json!({"q": "hi"}));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_workflow_variables_are_overridden_by_input() {
    let engine = engine();
    let mut workflow = linear();
    workflow["variables"] = json!({"q": "default", "lang": "en"});
    let id = deploy(&engine, workflow);

    let execute_id = engine.execute_async(&id, Vars::new().with("q", "hi"), "alice").unwrap();
    let info = wait_settled(&engine, &execute_id).await;
    let result = info.result.unwrap();
    assert_eq!(result.get::<String>("q").as_deref(), Some("hi"));
    assert_eq!(result.get::<String>("lang").as_deref(), Some("en"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_condition_selects_branch() {
    let engine = engine();
    let id = deploy(&engine, branching());

    let approved = engine.execute_async(&id, Vars::new().with("decision", "yes"), "alice").unwrap();
    let info = wait_settled(&engine, &approved).await;
    assert_eq!(info.status, RunStatus::Completed);
    assert_eq!(trail(&info), vec!["t0", "yes"]);
    assert!(!info.nodes.contains_key("no"));

    let rejected = engine.execute_async(&id, Vars::new().with("decision", "no"), "alice").unwrap();
    let info = wait_settled(&engine, &rejected).await;
    assert_eq!(trail(&info), vec!["t0", "no"]);
    assert!(!info.nodes.contains_key("yes"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_condition_without_matching_edge_completes() {
    let engine = engine();
    let id = deploy(
        &engine,
        json!({
            "id": "dead_end",
            "nodes": [
                {"id": "s", "type": "start"},
                {"id": "c", "type": "condition", "data": {"cases": [{"name": "go", "expression": "${flag} == on"}]}},
                {"id": "t", "type": "trail"},
                {"id": "e", "type": "end"}
            ],
            "edges": [
                {"source": "s", "target": "c"},
                {"source": "c", "target": "t", "condition": "go"},
                {"source": "t", "target": "e"}
            ]
        }),
    );

    let execute_id = engine.execute_async(&id, Vars::new().with("flag", "off"), "alice").unwrap();
    let info = wait_settled(&engine, &execute_id).await;
    assert_eq!(info.status, RunStatus::Completed);
    assert!(!info.nodes.contains_key("t"));
    assert_eq!(info.result.unwrap().get::<String>("condition").as_deref(), Some("default"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_suspend_and_resume() {
    let engine = engine();
    let id = deploy(&engine, approval());

    let execute_id = engine.execute_async(&id, Vars::new(), "alice").unwrap();
    let suspended = wait_settled(&engine, &execute_id).await;

    let params = vec![SuspendParam {
        name: "approved".to_string(),
        param_type: "boolean".to_string(),
        description: String::new(),
        required: true,
    }];
    assert_eq!(suspended.status, RunStatus::Suspended);
    assert_eq!(suspended.suspended_node_id.as_deref(), Some("h"));
    assert_eq!(suspended.suspend_for_parameters, params);
    let confirm = suspended.nodes["h"].clone();
    assert_eq!(confirm.status, RunStatus::Suspended);
    assert_eq!(confirm.suspend_for_parameters, params);

    let record = engine.store().get_execution_record_by_key(&execute_id).unwrap().unwrap();
    assert_eq!(record.status, "suspended");
    assert_eq!(record.suspend_detail().unwrap().node_id, "h");

    engine.resume(&execute_id, Vars::new().with("approved", true)).unwrap();
    let info = wait_settled(&engine, &execute_id).await;

    assert_eq!(info.status, RunStatus::Completed);
    assert_eq!(info.result.as_ref().and_then(|r| r.get::<bool>("approved")), Some(true));
    assert_eq!(trail(&info), vec!["t"]);
    assert_eq!(info.nodes["h"], confirm);
    assert!(info.suspended_node_id.is_none());
    assert!(info.suspend_for_parameters.is_empty());

    let record = engine.store().get_execution_record_by_key(&execute_id).unwrap().unwrap();
    assert_eq!(record.status, "completed");
    assert_eq!(record.suspend, None);

    let steps = engine.store().get_steps_by_key(&execute_id).unwrap();
    assert_eq!(steps.iter().filter(|s| s.node_id == "h").count(), 1);
    assert_eq!(steps.iter().find(|s| s.node_id == "h").unwrap().status, "suspended");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_resume_rejected_unless_suspended() {
    let engine = engine();
    let linear_id = deploy(&engine, linear());
    let failing_id = deploy(&engine, single("failing", json!({"id": "n", "type": "fail"})));

    let completed = engine.execute_async(&linear_id, Vars::new(), "alice").unwrap();
    wait_settled(&engine, &completed).await;
    assert_eq!(engine.resume(&completed, Vars::new()), Err(ChainError::NotSuspended(completed.clone())));

    let failed = engine.execute_async(&failing_id, Vars::new(), "alice").unwrap();
    wait_settled(&engine, &failed).await;
    assert_eq!(engine.resume(&failed, Vars::new()), Err(ChainError::NotSuspended(failed.clone())));

    assert_eq!(engine.resume("nope", Vars::new()), Err(ChainError::NotSuspended("nope".to_string())));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_resume_twice_is_rejected() {
    let engine = engine();
    let id = deploy(&engine, approval());

    let execute_id = engine.execute_async(&id, Vars::new(), "alice").unwrap();
    wait_settled(&engine, &execute_id).await;
    engine.resume(&execute_id, Vars::new().with("approved", false)).unwrap();
    wait_settled(&engine, &execute_id).await;

    assert_eq!(engine.resume(&execute_id, Vars::new()), Err(ChainError::NotSuspended(execute_id.clone())));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failure_stops_the_walk() {
    let engine = engine();
    let id = deploy(&engine, single("failing", json!({"id": "n", "type": "fail"})));

    let execute_id = engine.execute_async(&id, Vars::new(), "alice").unwrap();
    let info = wait_settled(&engine, &execute_id).await;

    assert_eq!(info.status, RunStatus::Failed);
    assert_eq!(info.message.as_deref(), Some("boom"));
    assert_eq!(info.error_node_id.as_deref(), Some("n"));
    assert_eq!(info.nodes["n"].status, RunStatus::Failed);
    assert_eq!(info.nodes["n"].message.as_deref(), Some("boom"));
    assert!(!info.nodes.contains_key("t"));
    assert!(info.result.is_none());

    let record = engine.store().get_execution_record_by_key(&execute_id).unwrap().unwrap();
    assert_eq!(record.status, "failed");
    assert_eq!(record.error.as_deref(), Some("boom"));
    let steps = engine.store().get_steps_by_key(&execute_id).unwrap();
    assert_eq!(steps.last().map(|s| (s.node_id.as_str(), s.error.as_deref())), Some(("n", Some("boom"))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_is_idempotent() {
    let engine = engine();
    let id = deploy(&engine, linear());

    let execute_id = engine.execute_async(&id, Vars::new(), "alice").unwrap();
    let first = wait_settled(&engine, &execute_id).await;
    let second = engine.get_status(&execute_id, None).unwrap();
    assert_eq!(first, second);

    let filtered = engine.get_status(&execute_id, Some(&["t2".to_string(), "missing".to_string()])).unwrap();
    assert_eq!(filtered.nodes.keys().collect::<Vec<_>>(), vec!["t2"]);

    assert_eq!(engine.get_status("nope", None), Err(ChainError::NotFound("nope".to_string())));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_node_type_fails_run() {
    let engine = engine();
    let id = deploy(&engine, single("webhook", json!({"id": "n", "type": "webhook"})));

    let execute_id = engine.execute_async(&id, Vars::new(), "alice").unwrap();
    let info = wait_settled(&engine, &execute_id).await;
    assert_eq!(info.status, RunStatus::Failed);
    assert_eq!(info.message.as_deref(), Some("unknown node type: webhook"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_node_config_fails_run() {
    let engine = engine();
    let id = deploy(&engine, single("bad_sub", json!({"id": "n", "type": "sub_workflow", "data": {"parameters": {}}})));

    let execute_id = engine.execute_async(&id, Vars::new(), "alice").unwrap();
    let info = wait_settled(&engine, &execute_id).await;
    assert_eq!(info.status, RunStatus::Failed);
    assert_eq!(info.nodes["n"].status, RunStatus::Failed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_execute_async_errors() {
    let engine = engine();
    assert_eq!(engine.execute_async("missing", Vars::new(), "alice"), Err(ChainError::WorkflowNotFound("missing".to_string())));

    let model: WorkflowModel = serde_json::from_value(json!({"id": "broken", "nodes": [{"id": "s", "type": "start"}]})).unwrap();
    assert_eq!(engine.deploy(&model), Err(ChainError::Validation("workflow has no end node".to_string())));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_running_node() {
    let engine = engine();
    let id = deploy(&engine, single("slow", json!({"id": "n", "type": "sleep", "data": {"ms": 10000}})));

    let execute_id = engine.execute_async(&id, Vars::new(), "alice").unwrap();
    wait_for(&engine, &execute_id, |info| info.nodes.get("n").is_some_and(|n| n.status == RunStatus::Running)).await;
    engine.cancel(&execute_id).unwrap();

    let info = wait_settled(&engine, &execute_id).await;
    assert_eq!(info.status, RunStatus::Failed);
    assert_eq!(info.message.as_deref(), Some("cancelled"));
    assert_eq!(info.nodes["n"].message.as_deref(), Some("cancelled"));
    assert!(!info.nodes.contains_key("t"));

    assert!(matches!(engine.cancel(&execute_id), Err(ChainError::Engine(_))));
    assert_eq!(engine.cancel("nope"), Err(ChainError::NotFound("nope".to_string())));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_running_runs_outlive_the_cache() {
    let engine = builder()
        .config(Config {
            run_cache_size: 0,
            ..Default::default()
        })
        .build()
        .unwrap();
    let id = deploy(&engine, single("slow", json!({"id": "n", "type": "sleep", "data": {"ms": 10000}})));

    let runs = (0..3).map(|_| engine.execute_async(&id, Vars::new(), "alice").unwrap()).collect::<Vec<_>>();
    for execute_id in runs.iter() {
        wait_for(&engine, execute_id, |info| info.nodes.get("n").is_some_and(|n| n.status == RunStatus::Running)).await;
        engine.cancel(execute_id).unwrap();
    }
    for execute_id in runs.iter() {
        // settled runs are read back from the store
        let info = wait_settled(&engine, execute_id).await;
        assert_eq!(info.status, RunStatus::Failed);
        assert_eq!(info.message.as_deref(), Some("cancelled"));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_caller_token_cancels_run() {
    let engine = engine();
    let id = deploy(&engine, single("slow", json!({"id": "n", "type": "sleep", "data": {"ms": 10000}})));

    let token = CancellationToken::new();
    let execute_id = engine.execute_async_with(&id, Vars::new(), "alice", token.clone()).unwrap();
    wait_for(&engine, &execute_id, |info| info.nodes.contains_key("n")).await;
    token.cancel();

    let info = wait_settled(&engine, &execute_id).await;
    assert_eq!(info.message.as_deref(), Some("cancelled"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_node_timeout() {
    let engine = engine();
    let id = deploy(&engine, single("timeout", json!({"id": "n", "type": "sleep", "data": {"ms": 5000, "timeoutMs": 50}})));

    let execute_id = engine.execute_async(&id, Vars::new(), "alice").unwrap();
    let info = wait_settled(&engine, &execute_id).await;
    assert_eq!(info.status, RunStatus::Failed);
    assert_eq!(info.message.as_deref(), Some("timeout"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_endless_script_times_out() {
    let engine = engine();
    let node = json!({"id": "n", "type": "code", "data": {"codeType": "javascript", "code": "function main() { while (true) {} }", "timeoutMs": 100}});
    let id = deploy(&engine, single("spin", node));

    let execute_id = engine.execute_async(&id, Vars::new(), "alice").unwrap();
    let info = wait_settled(&engine, &execute_id).await;
    assert_eq!(info.status, RunStatus::Failed);
    assert_eq!(info.message.as_deref(), Some("timeout"));
    assert_eq!(info.error_node_id.as_deref(), Some("n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_panic_fails_run() {
    let engine = engine();
    let id = deploy(&engine, single("panicking", json!({"id": "n", "type": "explode"})));

    let execute_id = engine.execute_async(&id, Vars::new(), "alice").unwrap();
    let info = wait_settled(&engine, &execute_id).await;
    assert_eq!(info.status, RunStatus::Failed);
    assert_eq!(info.message.as_deref(), Some("panic: kaboom"));
    assert_eq!(info.nodes["n"].status, RunStatus::Failed);

    // the engine keeps serving runs
    let id = deploy(&engine, linear());
    let execute_id = engine.execute_async(&id, Vars::new(), "alice").unwrap();
    assert_eq!(wait_settled(&engine, &execute_id).await.status, RunStatus::Completed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cycle_is_bounded() {
    let engine = builder()
        .config(Config {
            max_node_executions: 20,
            ..Default::default()
        })
        .build()
        .unwrap();
    let id = deploy(
        &engine,
        json!({
            "id": "cycle",
            "nodes": [
                {"id": "s", "type": "start"},
                {"id": "a", "type": "trail"},
                {"id": "b", "type": "trail"},
                {"id": "e", "type": "end"}
            ],
            "edges": [
                {"source": "s", "target": "a"},
                {"source": "a", "target": "b"},
                {"source": "b", "target": "a"}
            ]
        }),
    );

    let execute_id = engine.execute_async(&id, Vars::new(), "alice").unwrap();
    let info = wait_settled(&engine, &execute_id).await;
    assert_eq!(info.status, RunStatus::Failed);
    assert_eq!(info.message.as_deref(), Some("run exceeded 20 node executions"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_rebuilt_from_records() {
    let first = engine();
    let approval_id = deploy(&first, approval());
    let linear_id = deploy(&first, linear());

    let suspended = first.execute_async(&approval_id, Vars::new().with("q", "hi"), "alice").unwrap();
    let live = wait_settled(&first, &suspended).await;
    let completed = first.execute_async(&linear_id, Vars::new(), "alice").unwrap();
    let live_completed = wait_settled(&first, &completed).await;

    // a second engine over the same store knows nothing about these runs in memory
    let second = builder().store(first.store()).build().unwrap();

    let rebuilt = second.get_status(&suspended, None).unwrap();
    assert_eq!(rebuilt.status, RunStatus::Suspended);
    assert_eq!(rebuilt.suspended_node_id, live.suspended_node_id);
    assert_eq!(rebuilt.suspend_for_parameters, live.suspend_for_parameters);
    assert_eq!(rebuilt.nodes["h"].suspend_for_parameters, live.nodes["h"].suspend_for_parameters);

    let rebuilt = second.get_status(&completed, None).unwrap();
    assert_eq!(rebuilt.status, RunStatus::Completed);
    assert_eq!(rebuilt.result, live_completed.result);
    assert_eq!(rebuilt.nodes.keys().collect::<Vec<_>>(), live_completed.nodes.keys().collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_resume_from_records() {
    let first = engine();
    let id = deploy(&first, approval());
    let execute_id = first.execute_async(&id, Vars::new().with("q", "hi"), "alice").unwrap();
    wait_settled(&first, &execute_id).await;
    first.shutdown();

    let second = builder().store(first.store()).build().unwrap();
    second.resume(&execute_id, Vars::new().with("approved", true)).unwrap();
    let info = wait_settled(&second, &execute_id).await;

    assert_eq!(info.status, RunStatus::Completed);
    let result = info.result.clone().unwrap();
    assert_eq!(result.get::<String>("q").as_deref(), Some("hi"));
    assert_eq!(result.get::<bool>("approved"), Some(true));
    assert_eq!(trail(&info), vec!["t"]);

    let steps = second.store().get_steps_by_key(&execute_id).unwrap();
    let order = steps.iter().map(|s| (s.seq, s.node_id.as_str())).collect::<Vec<_>>();
    assert_eq!(order, vec![(1, "s"), (2, "h"), (3, "t"), (4, "e")]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sub_workflow() {
    let engine = engine();
    let child = deploy(
        &engine,
        json!({
            "id": "child",
            "nodes": [
                {"id": "cs", "type": "start"},
                {"id": "ct", "type": "trail"},
                {"id": "ce", "type": "end"}
            ],
            "edges": [
                {"source": "cs", "target": "ct"},
                {"source": "ct", "target": "ce"}
            ]
        }),
    );
    let parent = deploy(&engine, single("parent", json!({"id": "n", "type": "sub_workflow", "data": {"workflowId": child, "parameters": {"x": "${q}"}}})));

    let execute_id = engine.execute_async(&parent, Vars::new().with("q", "hi"), "alice").unwrap();
    let info = wait_settled(&engine, &execute_id).await;

    assert_eq!(info.status, RunStatus::Completed);
    let result = info.result.clone().unwrap();
    assert_eq!(result.get::<String>("x").as_deref(), Some("hi"));
    assert_eq!(trail(&info), vec!["ct", "t"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sub_workflow_failure_and_depth() {
    let engine = builder()
        .config(Config {
            max_subflow_depth: 2,
            ..Default::default()
        })
        .build()
        .unwrap();
    let failing = deploy(&engine, single("failing", json!({"id": "n", "type": "fail"})));
    let parent = deploy(&engine, single("parent", json!({"id": "n", "type": "sub_workflow", "data": {"workflowId": failing}})));

    let execute_id = engine.execute_async(&parent, Vars::new(), "alice").unwrap();
    let info = wait_settled(&engine, &execute_id).await;
    assert_eq!(info.status, RunStatus::Failed);
    assert_eq!(info.message.as_deref(), Some("sub-workflow failing failed: node n failed: boom"));

    let recursive = deploy(&engine, single("recursive", json!({"id": "n", "type": "sub_workflow", "data": {"workflowId": "recursive"}})));
    let execute_id = engine.execute_async(&recursive, Vars::new(), "alice").unwrap();
    let info = wait_settled(&engine, &execute_id).await;
    assert_eq!(info.status, RunStatus::Failed);
    assert!(info.message.unwrap().contains("exceeds the limit of 2"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sub_workflow_fails_when_parent_times_out() {
    let engine = engine();
    let child = deploy(&engine, single("slow_child", json!({"id": "n", "type": "sleep", "data": {"ms": 3000}})));
    let parent = deploy(&engine, single("impatient", json!({"id": "n", "type": "sub_workflow", "data": {"workflowId": child, "timeoutMs": 100}})));

    let execute_id = engine.execute_async(&parent, Vars::new(), "alice").unwrap();
    let info = wait_settled(&engine, &execute_id).await;
    assert_eq!(info.status, RunStatus::Failed);
    assert_eq!(info.message.as_deref(), Some("timeout"));

    let records = engine.store().records().unwrap().query(&Query::new().filter("workflow_id", "slow_child")).unwrap().rows;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.status, "failed");
    assert_eq!(record.error.as_deref(), Some("timeout"));
    assert!(record.end_time > 0);

    let child_info = engine.get_status(&record.exec_key, None).unwrap();
    assert_eq!(child_info.status, RunStatus::Failed);
    assert_eq!(child_info.nodes["n"].status, RunStatus::Failed);
    assert_eq!(child_info.error_node_id.as_deref(), Some("n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sub_workflow_fails_when_parent_is_cancelled() {
    let engine = engine();
    let child = deploy(&engine, single("slow_child", json!({"id": "n", "type": "sleep", "data": {"ms": 10000}})));
    let parent = deploy(&engine, single("parent", json!({"id": "n", "type": "sub_workflow", "data": {"workflowId": child}})));

    let execute_id = engine.execute_async(&parent, Vars::new(), "alice").unwrap();
    wait_for(&engine, &execute_id, |info| info.nodes.get("n").is_some_and(|n| n.status == RunStatus::Running)).await;
    let records = loop {
        let rows = engine.store().records().unwrap().query(&Query::new().filter("workflow_id", "slow_child")).unwrap().rows;
        if !rows.is_empty() {
            break rows;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    };
    let child_id = records[0].exec_key.clone();
    wait_for(&engine, &child_id, |info| info.nodes.get("n").is_some_and(|n| n.status == RunStatus::Running)).await;

    engine.cancel(&execute_id).unwrap();
    let info = wait_settled(&engine, &execute_id).await;
    assert_eq!(info.message.as_deref(), Some("cancelled"));

    let child_info = wait_settled(&engine, &child_id).await;
    assert_eq!(child_info.status, RunStatus::Failed);
    assert_eq!(child_info.message.as_deref(), Some("cancelled"));
    assert!(matches!(engine.cancel(&child_id), Err(ChainError::Engine(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_execute_node_preview() {
    let engine = engine();
    let id = deploy(
        &engine,
        json!({
            "id": "preview",
            "nodes": [
                {"id": "s", "type": "start"},
                {"id": "tpl", "type": "code", "data": {"codeType": "template", "code": "hello ${name}"}},
                {"id": "h", "type": "human_confirm", "parameters": [{"name": "ok"}]},
                {"id": "f", "type": "fail"},
                {"id": "w", "type": "webhook"},
                {"id": "e", "type": "end"}
            ],
            "edges": [
                {"source": "s", "target": "tpl"},
                {"source": "tpl", "target": "e"}
            ]
        }),
    );

    let output = engine.execute_node(&id, "tpl", Vars::new().with("name", "ann")).await.unwrap();
    assert_eq!(output, Vars::new().with("output", "hello ann"));

    assert_eq!(
        engine.execute_node(&id, "h", Vars::new()).await,
        Err(ChainError::Suspended(vec![SuspendParam {
            name: "ok".to_string(),
            ..Default::default()
        }]))
    );
    assert_eq!(
        engine.execute_node(&id, "f", Vars::new()).await,
        Err(ChainError::NodeFailure {
            node_id: "f".to_string(),
            message: "boom".to_string(),
        })
    );
    assert_eq!(engine.execute_node(&id, "w", Vars::new()).await, Err(ChainError::UnknownNodeType("webhook".to_string())));
    assert_eq!(engine.execute_node(&id, "zz", Vars::new()).await, Err(ChainError::NodeNotFound("zz".to_string())));
    assert_eq!(engine.execute_node("missing", "s", Vars::new()).await, Err(ChainError::WorkflowNotFound("missing".to_string())));

    // previews leave no records behind
    let page = engine.store().records().unwrap().query(&Query::new()).unwrap();
    assert_eq!(page.count, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_channel_events() {
    let engine = engine();
    let id = deploy(&engine, approval());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let completed = Arc::new(Mutex::new(Vec::new()));
    let events = ChannelEvent::channel(engine.channel(), ChannelOptions::default()).unwrap();
    let sink = seen.clone();
    events.on_event(move |e| {
        if let chainflow::GraphEvent::Run(run) = &e.event {
            sink.lock().unwrap().push(run.str().to_string());
        }
    });
    let sink = completed.clone();
    events.on_complete(move |execute_id| sink.lock().unwrap().push(execute_id));

    let execute_id = engine.execute_async(&id, Vars::new(), "alice").unwrap();
    wait_settled(&engine, &execute_id).await;
    engine.resume(&execute_id, Vars::new().with("approved", true)).unwrap();
    wait_settled(&engine, &execute_id).await;

    for _ in 0..100 {
        if !completed.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(*completed.lock().unwrap(), vec![execute_id]);
    assert_eq!(*seen.lock().unwrap(), vec!["started", "suspended", "resumed", "completed"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_rejects_new_runs() {
    let engine = EngineBuilder::new().build().unwrap();
    let id = deploy(&engine, approval());
    engine.shutdown();
    assert_eq!(engine.execute_async(&id, Vars::new(), "alice"), Err(ChainError::Engine("engine is shut down".to_string())));
}
