use std::{thread, time::Duration};

use chainflow::{ChainInfo, ChannelEvent, ChannelOptions, Engine, EngineBuilder, RunStatus, Vars, WorkflowModel};

fn wait(
    engine: &Engine,
    execute_id: &str,
) -> ChainInfo {
    loop {
        let info = engine.get_status(execute_id, None).unwrap();
        if info.status != RunStatus::Running {
            return info;
        }
        thread::sleep(Duration::from_millis(50));
    }
}

fn main() {
    let engine = EngineBuilder::new().build().unwrap();

    let workflow = WorkflowModel::from_json(include_str!("./workflow.json")).unwrap();
    engine.deploy(&workflow).unwrap();

    let events = ChannelEvent::channel(engine.channel(), ChannelOptions::default()).unwrap();
    events.on_suspend(|e| println!("Run suspended at node {}", e.node_id));
    events.on_complete(|execute_id| println!("Run completed: {}", execute_id));

    let execute_id = engine.execute_async(&workflow.id, Vars::new().with("amount", 250), "demo").unwrap();

    let info = wait(&engine, &execute_id);
    println!("Waiting for: {:?}", info.suspend_for_parameters);

    engine.resume(&execute_id, Vars::new().with("approved", true)).unwrap();

    let info = wait(&engine, &execute_id);
    let result: serde_json::Value = info.result.unwrap_or_default().into();
    println!("Result: {:#}", result);

    engine.shutdown();
}
