//! Controller integration tests: dependency resolution, failure isolation,
//! supersession and edits, with bridge fakes.

use datapanel_engine::{EngineError, PanelResult, ProjectController};
use datapanel_model::{
    DataFormat, EntityId, HttpConnectorConfig, ModelError, PanelInfo, PanelKind, ProgramLanguage,
    ProjectPage, SqlConnectorConfig, TableColumn,
};
use datapanel_test_utils::{
    evaluator_with, http_page, pipeline_page, project_with, FakeHttpTransport, FnScriptRuntime,
    GatedScriptRuntime,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn controller_for(page: ProjectPage) -> (ProjectController, EntityId) {
    let (state, first) = project_with(vec![page]);
    let controller = ProjectController::new(
        state,
        evaluator_with(None, Some(FnScriptRuntime::commands())),
    );
    (controller, first.unwrap())
}

fn value(result: &PanelResult) -> serde_json::Value {
    result.value.clone().unwrap_or_default()
}

#[tokio::test]
async fn sql_over_csv_literal() {
    let (controller, page) = controller_for(pipeline_page());
    controller.run_panel(&page, 0).await.unwrap();
    let result = controller.run_panel(&page, 1).await.unwrap();

    assert_eq!(result.exception, None);
    assert_eq!(
        value(&result),
        json!([{"name": "Morgan", "age": 17}, {"name": "James", "age": 22}])
    );
    assert!(result.last_run.is_some());
}

#[tokio::test]
async fn table_over_unrun_source_is_empty() {
    let (controller, page) = controller_for(pipeline_page());
    let result = controller.run_panel(&page, 2).await.unwrap();
    assert_eq!(result.exception, None);
    assert_eq!(value(&result), json!([]));
}

#[tokio::test]
async fn table_with_out_of_range_source_is_empty() {
    let mut page = pipeline_page();
    page.panels[2] = PanelInfo::table("Names", Vec::new(), 5);
    let (controller, page) = controller_for(page);

    let results = controller.run_page(&page).await.unwrap();
    assert_eq!(value(&results[2]), json!([]));
    assert!(!results[2].failed());
}

#[tokio::test]
async fn table_projects_sql_result() {
    let (controller, page) = controller_for(pipeline_page());
    let results = controller.run_page(&page).await.unwrap();
    assert_eq!(value(&results[2]), json!([{"name": "Morgan"}, {"name": "James"}]));
}

#[tokio::test]
async fn forward_sql_reference_is_no_such_table() {
    let page = ProjectPage::new(
        "Forward",
        vec![
            PanelInfo::sql("Early", SqlConnectorConfig::in_memory(), "SELECT * FROM DM_getPanel(1)"),
            PanelInfo::literal("Late", DataFormat::Csv, "a\n1"),
        ],
    );
    let (controller, page) = controller_for(page);
    controller.run_panel(&page, 1).await.unwrap();

    let result = controller.run_panel(&page, 0).await.unwrap();
    let exception = result.exception.unwrap();
    assert!(exception.contains("no such table"), "{exception}");
}

#[tokio::test]
async fn failed_panel_hides_value_downstream() {
    let page = ProjectPage::new(
        "Failing",
        vec![
            PanelInfo::program("Script", ProgramLanguage::Javascript, "return [1, 2]"),
            PanelInfo::program("Copy", ProgramLanguage::Javascript, "copy 0"),
        ],
    );
    let (controller, page) = controller_for(page);

    controller.run_page(&page).await.unwrap();
    assert_eq!(value(&controller.results(&page).unwrap()[1]), json!([1, 2]));

    let mut broken = controller.snapshot().pages[0].panels[0].clone();
    broken.content = "raise boom".to_string();
    controller.update_panel(&page, 0, broken).unwrap();

    let results = controller.run_page(&page).await.unwrap();
    assert_eq!(results[0].exception.as_deref(), Some("script failed: boom"));
    assert_eq!(value(&results[0]), json!([1, 2]));
    assert_eq!(results[1].exception, None);
    assert_eq!(value(&results[1]), json!(null));
}

#[tokio::test]
async fn http_failure_keeps_prior_value() {
    let transport = FakeHttpTransport::new();
    transport.respond("https://api.test/people", 200, r#"[{"name": "Ada", "age": 36}]"#);

    let (state, page) = project_with(vec![http_page("https://api.test/people")]);
    let page = page.unwrap();
    let controller = ProjectController::new(state, evaluator_with(Some(transport.clone()), None));

    let results = controller.run_page(&page).await.unwrap();
    assert_eq!(value(&results[0]), json!([{"name": "Ada", "age": 36}]));
    assert_eq!(value(&results[1])["series"], json!([{"x": "Ada", "y": 36}]));
    let first_run = results[0].last_run.unwrap();

    transport.fail("https://api.test/people", "connection refused");
    let result = controller.run_panel(&page, 0).await.unwrap();
    assert_eq!(
        result.exception.as_deref(),
        Some("http request failed: connection refused")
    );
    assert_eq!(value(&result), json!([{"name": "Ada", "age": 36}]));
    assert!(result.last_run.unwrap() >= first_run);

    let graph = controller.run_panel(&page, 1).await.unwrap();
    assert_eq!(graph.value.unwrap()["series"], json!([]));
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn http_status_is_an_exception() {
    let transport = FakeHttpTransport::new();
    transport.respond("https://api.test/missing", 404, "not here");
    let page = ProjectPage::new(
        "Remote",
        vec![PanelInfo::http(
            "Fetch",
            HttpConnectorConfig::get("https://api.test/missing"),
            DataFormat::Csv,
        )],
    );
    let (state, page_id) = project_with(vec![page]);
    let controller = ProjectController::new(state, evaluator_with(Some(transport), None));

    let result = controller.run_panel(&page_id.unwrap(), 0).await.unwrap();
    assert_eq!(
        result.exception.as_deref(),
        Some("http request returned status 404: not here")
    );
    assert_eq!(result.value, None);
}

#[tokio::test]
async fn latest_started_run_wins() {
    let gated = GatedScriptRuntime::new();
    let page = ProjectPage::new(
        "Slow",
        vec![PanelInfo::program("Slow", ProgramLanguage::Javascript, "wait first")],
    );
    let (state, page_id) = project_with(vec![page]);
    let page_id = page_id.unwrap();
    let controller = Arc::new(ProjectController::new(
        state,
        evaluator_with(None, Some(gated.clone())),
    ));

    let first = {
        let controller = controller.clone();
        let page_id = page_id.clone();
        tokio::spawn(async move { controller.run_panel(&page_id, 0).await })
    };
    tokio::task::yield_now().await;

    let mut edited = controller.snapshot().pages[0].panels[0].clone();
    edited.content = "wait second".to_string();
    controller.update_panel(&page_id, 0, edited).unwrap();

    let second = {
        let controller = controller.clone();
        let page_id = page_id.clone();
        tokio::spawn(async move { controller.run_panel(&page_id, 0).await })
    };
    tokio::task::yield_now().await;

    gated.release("second");
    let second = second.await.unwrap().unwrap();
    assert_eq!(second.value, Some(json!("second")));

    gated.release("first");
    first.await.unwrap().unwrap();
    let slot = controller.results(&page_id).unwrap().remove(0);
    assert_eq!(slot.value, Some(json!("second")));
}

#[tokio::test]
async fn runs_of_different_panels_are_independent() {
    let gated = GatedScriptRuntime::new();
    let page = ProjectPage::new(
        "Parallel",
        vec![
            PanelInfo::program("A", ProgramLanguage::Javascript, "wait a"),
            PanelInfo::program("B", ProgramLanguage::Javascript, "wait b"),
        ],
    );
    let (state, page_id) = project_with(vec![page]);
    let page_id = page_id.unwrap();
    let controller = Arc::new(ProjectController::new(
        state,
        evaluator_with(None, Some(gated.clone())),
    ));

    let runs: Vec<_> = (0..2)
        .map(|index| {
            let controller = controller.clone();
            let page_id = page_id.clone();
            tokio::spawn(async move { controller.run_panel(&page_id, index).await })
        })
        .collect();
    gated.release("b");
    gated.release("a");
    for run in runs {
        run.await.unwrap().unwrap();
    }

    let results = controller.results(&page_id).unwrap();
    assert_eq!(results[0].value, Some(json!("a")));
    assert_eq!(results[1].value, Some(json!("b")));
}

#[tokio::test]
async fn retyping_another_panel_keeps_in_flight_run() {
    let gated = GatedScriptRuntime::new();
    let page = ProjectPage::new(
        "Mixed",
        vec![
            PanelInfo::program("A", ProgramLanguage::Javascript, "wait a"),
            PanelInfo::literal("B", DataFormat::Json, "[1]"),
        ],
    );
    let (state, page_id) = project_with(vec![page]);
    let page_id = page_id.unwrap();
    let controller = Arc::new(ProjectController::new(
        state,
        evaluator_with(None, Some(gated.clone())),
    ));

    let run = {
        let controller = controller.clone();
        let page_id = page_id.clone();
        tokio::spawn(async move { controller.run_panel(&page_id, 0).await })
    };
    tokio::task::yield_now().await;

    controller.change_panel_type(&page_id, 1, "table").unwrap();
    gated.release("a");
    let result = run.await.unwrap().unwrap();
    assert_eq!(result.value, Some(json!("a")));

    let results = controller.results(&page_id).unwrap();
    assert_eq!(results[0].value, Some(json!("a")));
    assert!(!results[1].has_run());
}

#[tokio::test]
async fn insert_shifts_results_without_rewriting_sources() {
    let (controller, page) = controller_for(pipeline_page());
    controller.run_page(&page).await.unwrap();

    controller
        .insert_panel(&page, 0, PanelInfo::literal("New", DataFormat::Json, "[]"))
        .unwrap();
    let results = controller.results(&page).unwrap();
    assert_eq!(results.len(), 4);
    assert!(!results[0].has_run());
    assert_eq!(
        value(&results[2]),
        json!([{"name": "Morgan", "age": 17}, {"name": "James", "age": 22}])
    );

    let state = controller.snapshot();
    assert_eq!(state.pages[0].panels[3].panel_source(), Some(1));
}

#[tokio::test]
async fn retype_keeps_name_and_content() {
    let (controller, page) = controller_for(pipeline_page());
    let before = controller.snapshot().pages[0].panels[1].clone();

    controller.change_panel_type(&page, 1, "table").unwrap();
    let after = controller.snapshot().pages[0].panels[1].clone();
    assert_eq!(after.kind(), PanelKind::Table);
    assert_eq!(after.name, before.name);
    assert_eq!(after.content, before.content);
    assert_eq!(after.panel_source(), Some(0));

    let err = controller.change_panel_type(&page, 1, "spreadsheet").unwrap_err();
    assert!(matches!(err, EngineError::Model(ModelError::UnknownPanelType(_))));
}

#[tokio::test]
async fn remove_panel_drops_its_slot() {
    let (controller, page) = controller_for(pipeline_page());
    controller.run_page(&page).await.unwrap();
    let removed = controller.remove_panel(&page, 0).unwrap();
    assert_eq!(removed.name, "People");

    let results = controller.results(&page).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].has_run());

    let columns = vec![TableColumn::new("Age", "age")];
    let index = controller
        .add_panel(&page, PanelInfo::table("Ages", columns, 0))
        .unwrap();
    let result = controller.run_panel(&page, index).await.unwrap();
    assert_eq!(value(&result), json!([{"age": 17}, {"age": 22}]));
}
