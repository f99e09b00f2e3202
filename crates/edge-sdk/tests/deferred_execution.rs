//! End-to-end behaviour of deferred work driven through `RenderDriver`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use edge_sdk::prelude::*;

fn driver(app: App, config: AfterConfig) -> (RenderDriver, Arc<MemorySink>, Arc<MemorySink>) {
    let runtime = Arc::new(MemorySink::new());
    let build = Arc::new(MemorySink::new());
    let reporter = ExecutionReporter::new(runtime.clone(), build.clone());
    (RenderDriver::new(app, config, reporter), runtime, build)
}

#[tokio::test]
async fn test_tasks_run_in_registration_order() {
    let app = App::new("fifo").route(RouteConfig::page("/"), |scope: RequestScope| async move {
        for name in ["A", "B", "C"] {
            scope.after(move |scope| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                scope.apis().log(name);
                Ok(())
            })?;
        }
        Ok("body".to_string())
    });
    let (driver, runtime, _) = driver(app, AfterConfig::development());

    driver.render(IncomingRequest::get("/")).await.unwrap();
    driver.settle().await;

    assert_eq!(runtime.messages(), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_response_does_not_wait_for_deferred_work() {
    let (release, gate) = tokio::sync::oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(gate)));

    let app = App::new("fast").route(RouteConfig::page("/"), move |scope: RequestScope| {
        let gate = gate.lock().unwrap().take();
        async move {
            scope.after(move |scope| async move {
                if let Some(gate) = gate {
                    gate.await?;
                }
                scope.apis().log("released");
                Ok(())
            })?;
            Ok("body".to_string())
        }
    });
    let (driver, runtime, _) = driver(app, AfterConfig::development());

    let rendered = driver.render(IncomingRequest::get("/")).await.unwrap();
    assert_eq!(rendered.body, "body");
    assert!(!runtime.contains("released"));

    release.send(()).unwrap();
    driver.settle().await;
    assert!(runtime.contains("released"));
}

#[tokio::test]
async fn test_failing_task_does_not_affect_siblings_or_response() {
    let app = App::new("isolation").route(RouteConfig::page("/"), |scope: RequestScope| async move {
        scope.after(|_| async { Err(anyhow::anyhow!("analytics endpoint down")) })?;
        scope.after(|_| async { panic!("unexpected state") })?;
        scope.after(|scope| async move {
            scope.apis().log("still ran");
            Ok(())
        })?;
        Ok("ok".to_string())
    });
    let (driver, runtime, _) = driver(app, AfterConfig::development());

    let rendered = driver.render(IncomingRequest::get("/")).await.unwrap();
    let results = driver.settle().await;

    assert_eq!(rendered.body, "ok");
    assert_eq!(results[0].failed, 2);
    assert_eq!(results[0].completed, 1);
    assert!(runtime.contains("Error: analytics endpoint down"));
    assert!(runtime.contains("still ran"));
}

#[tokio::test]
async fn test_nested_after_runs_before_teardown() {
    let app = App::new("nested").route(RouteConfig::page("/"), |scope: RequestScope| async move {
        scope.after(|scope| async move {
            assert_eq!(scope.context().phase(), ContextPhase::ResponseSent);
            scope.after(|scope| async move {
                scope.apis().log("nested");
                Ok(())
            })?;
            Ok(())
        })?;
        Ok(String::new())
    });
    let (driver, runtime, _) = driver(app, AfterConfig::development());

    driver.render(IncomingRequest::get("/")).await.unwrap();
    let results = driver.settle().await;

    assert_eq!(results[0].completed, 2);
    assert!(runtime.contains("nested"));
}

#[tokio::test]
async fn test_after_rejected_once_torn_down() {
    let leaked: Arc<Mutex<Option<RequestScope>>> = Arc::new(Mutex::new(None));
    let slot = leaked.clone();

    let app = App::new("leak").route(RouteConfig::page("/"), move |scope: RequestScope| {
        *slot.lock().unwrap() = Some(scope.clone());
        async move { Ok(String::new()) }
    });
    let (driver, _, _) = driver(app, AfterConfig::development());

    driver.render(IncomingRequest::get("/")).await.unwrap();
    driver.settle().await;

    let scope = leaked.lock().unwrap().take().unwrap();
    assert_eq!(scope.context().phase(), ContextPhase::TornDown);
    let err = scope.after(|_| async { Ok(()) }).unwrap_err();
    assert!(matches!(err, RegistrationError::ContextTornDown { .. }));
}

#[tokio::test]
async fn test_snapshot_taken_while_live_stays_usable() {
    let app = App::new("snapshot").route(RouteConfig::page("/"), |scope: RequestScope| async move {
        let agent = scope
            .apis()
            .headers()?
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        scope.after(move |scope| async move {
            scope.apis().log(format!("agent={}", agent));
            Ok(())
        })?;
        Ok(String::new())
    });
    let (driver, runtime, _) = driver(app, AfterConfig::development());

    driver
        .render(IncomingRequest::get("/").header("user-agent", "curl/8"))
        .await
        .unwrap();
    driver.settle().await;

    assert!(runtime.contains("agent=curl/8"));
    assert!(!runtime.contains("Error:"));
}

#[tokio::test]
async fn test_future_built_during_render_is_checked_when_polled() {
    let app = App::new("late-poll").route(RouteConfig::page("/"), |scope: RequestScope| async move {
        let apis = scope.apis().clone();
        let lookup = async move { apis.cookies().map(|jar| jar.len()) };
        scope.after(move |_| async move {
            lookup.await?;
            Ok(())
        })?;
        Ok(String::new())
    });
    let (driver, runtime, _) = driver(app, AfterConfig::development());

    driver.render(IncomingRequest::get("/")).await.unwrap();
    let results = driver.settle().await;

    assert_eq!(results[0].denied, 1);
    assert_eq!(runtime.count_matching("used \"cookies\""), 1);
}

#[tokio::test]
async fn test_concurrent_requests_keep_separate_contexts() {
    let app = App::new("concurrent").route(RouteConfig::page("/"), |scope: RequestScope| async move {
        let id = scope.context().request_id().clone();
        scope.after(move |scope| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(scope.context().request_id(), &id);
            scope.apis().log(format!("done {}", id));
            Ok(())
        })?;
        Ok(String::new())
    });
    let (driver, runtime, _) = driver(app, AfterConfig::development());

    let mut ids = Vec::new();
    for _ in 0..8 {
        ids.push(driver.render(IncomingRequest::get("/")).await.unwrap().request_id);
    }
    let results = driver.settle().await;

    assert_eq!(results.len(), 8);
    assert!(results.iter().all(|r| r.completed == 1));
    for id in ids {
        assert_eq!(runtime.count_matching(&format!("done {}", id)), 1);
    }
}

#[tokio::test]
async fn test_shutdown_grace_drops_pending_work() {
    let app = App::new("slow").route(RouteConfig::page("/"), |scope: RequestScope| async move {
        scope.after(|_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })?;
        scope.after(|scope| async move {
            scope.apis().log("never");
            Ok(())
        })?;
        Ok(String::new())
    });
    let config = AfterConfig::production().with_shutdown_grace(Duration::from_millis(25));
    let (driver, runtime, _) = driver(app, config);

    driver.render(IncomingRequest::get("/")).await.unwrap();
    let results = driver.shutdown().await;

    assert_eq!(results[0].cancelled, 1);
    assert_eq!(results[0].dropped, 1);
    assert!(!runtime.contains("never"));
    assert_eq!(runtime.count_matching("Dropped 1 deferred task(s)"), 1);
}
