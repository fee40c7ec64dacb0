use bollard::Docker;
use bollard::query_parameters::{CreateImageOptions, ListContainersOptions};
use futures::TryStreamExt;
use meshgate_core::prelude::*;
use meshgate_docker::DockerRuntime;
use pretty_assertions::assert_eq;
use std::collections::HashMap;

const IMAGE: &str = "alpine:3.20";

async fn pull(client: &Docker) {
    let options = CreateImageOptions {
        from_image: Some("alpine".to_string()),
        tag: Some("3.20".to_string()),
        ..Default::default()
    };
    client
        .create_image(Some(options), None, None)
        .try_collect::<Vec<_>>()
        .await
        .unwrap();
}

async fn created_containers(client: &Docker) -> usize {
    let options = ListContainersOptions {
        all: true,
        filters: Some(HashMap::from([
            ("ancestor".to_string(), vec![IMAGE.to_string()]),
            ("status".to_string(), vec!["created".to_string()]),
        ])),
        ..Default::default()
    };
    client.list_containers(Some(options)).await.unwrap().len()
}

fn plan(args: &[&str]) -> RunPlan {
    RunPlan {
        tag: IMAGE.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
        env: Vec::new(),
        bindings: Vec::new(),
        device_requests: None,
        auto_remove: true,
    }
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn short_lived_container_reports_its_exit() {
    let client = Docker::connect_with_local_defaults().unwrap();
    pull(&client).await;

    let runtime = DockerRuntime::new(client);
    for _ in 0..5 {
        let handle = runtime.run(plan(&["echo", "hi"])).await.unwrap();
        let events: Vec<RunEvent> = handle.events.try_collect().await.unwrap();

        assert_eq!(events.last(), Some(&RunEvent::Exited(0)));
    }

    let handle = runtime.run(plan(&["sh", "-c", "exit 3"])).await.unwrap();
    let events: Vec<RunEvent> = handle.events.try_collect().await.unwrap();
    assert_eq!(events.last(), Some(&RunEvent::Exited(3)));
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn failed_start_leaves_no_container() {
    let client = Docker::connect_with_local_defaults().unwrap();
    pull(&client).await;
    let before = created_containers(&client).await;

    let runtime = DockerRuntime::new(client.clone());
    let err = runtime
        .run(plan(&["/does/not/exist"]))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, ComputeError::Launch(_)), "{err:?}");
    assert_eq!(created_containers(&client).await, before);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn missing_image_is_reported() {
    let runtime = DockerRuntime::connect_local().unwrap();
    let err = runtime
        .run(RunPlan {
            tag: "meshgate-does-not-exist:latest".to_string(),
            ..plan(&[])
        })
        .await
        .err()
        .unwrap();

    assert_eq!(
        err,
        ComputeError::ImageNotFound("meshgate-does-not-exist:latest".to_string())
    );
}
