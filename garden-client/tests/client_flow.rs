mod common;

use chrono::Local;
use common::FakeApi;
use garden_client::models::{
    Bed, CareScheduleDraft, CareTask, CommentDraft, ForumPostDraft, Interval, LayoutData,
    LayoutDraft, PlantDraft, PlantPatch, ReactionKind, TipDraft, TipPatch,
};
use garden_client::session::SessionChange;
use garden_client::{
    CareSchedules, ClientConfig, Comments, ForumPosts, GardenClient, GardenClientError, Layouts,
    MemoryStorage, Phase, Plants, Saved, SessionHolder, SessionStorage, Tips,
};
use serde_json::json;
use std::sync::Arc;

async fn signed_in(api: &FakeApi) -> GardenClient {
    let client = GardenClient::connect(&api.base_url).unwrap();
    client.register("alice", "a@x.com", "pw").await.unwrap();
    client.login("a@x.com", "pw").await.unwrap();
    client
}

#[tokio::test]
async fn register_login_add_and_delete_a_plant() {
    let api = FakeApi::start().await;
    let client = GardenClient::connect(&api.base_url).unwrap();

    let registered = client.register("alice", "a@x.com", "pw").await.unwrap();
    assert_eq!(registered.access_token, None);
    assert!(!client.is_signed_in());

    let login = client.login("a@x.com", "pw").await.unwrap();
    assert!(!login.access_token.is_empty());
    assert_eq!(client.session().username().as_deref(), Some("alice"));

    let plants = client.view(Plants);
    plants.mount().await.unwrap();
    assert!(plants.items().is_empty());

    plants.open_add(PlantDraft::named("Basil"));
    let basil = plants.submit().await.unwrap().into_entity().unwrap();
    let items = plants.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Basil");
    assert_eq!(items[0].id, basil.id);

    plants.request_delete(basil.id);
    plants.confirm_delete().await.unwrap();
    assert!(plants.items().is_empty());

    plants.reload().await.unwrap();
    assert!(plants.items().is_empty());
}

#[tokio::test]
async fn confirmation_bodies_still_update_the_list() {
    let api = FakeApi::start().await;
    let client = signed_in(&api).await;
    api.acknowledge_writes();

    let plants = client.view(Plants);
    plants.mount().await.unwrap();
    plants.open_add(PlantDraft::named("Basil"));
    let saved = plants.submit().await.unwrap();

    assert_eq!(
        saved,
        Saved::Acknowledged {
            message: Some("Added successfully".into())
        }
    );
    assert!(plants.phase().is_idle());
    assert_eq!(api.last_request().method, "GET");
    let items = plants.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Basil");

    plants
        .open_edit(
            items[0].id,
            PlantPatch {
                name: Some("Thai basil".into()),
                ..PlantPatch::default()
            },
        )
        .unwrap();
    plants.submit().await.unwrap();
    assert_eq!(plants.items()[0].name, "Thai basil");
    assert!(plants.phase().is_idle());
}

#[tokio::test]
async fn care_schedule_is_unwrapped_from_its_envelope() {
    let api = FakeApi::start().await;
    let client = signed_in(&api).await;
    let plant = client
        .http()
        .create(&Plants, &PlantDraft::named("Mint"))
        .await
        .unwrap()
        .into_entity()
        .unwrap();
    api.acknowledge_writes();

    let today = Local::now().date_naive();
    let saved = client
        .http()
        .create(
            &CareSchedules::for_plant(plant.id),
            &CareScheduleDraft {
                plant_id: plant.id,
                task: CareTask::Fertilizing,
                schedule_date: today,
                interval: Interval::Weekly,
            },
        )
        .await
        .unwrap();

    let schedule = saved.entity().expect("schedule row in the envelope");
    assert_eq!(schedule.plant_id, plant.id);
    assert_eq!(schedule.interval, Interval::Weekly);
}

#[tokio::test]
async fn authorization_header_follows_the_session() {
    let api = FakeApi::start().await;
    let client = GardenClient::connect(&api.base_url).unwrap();
    client.register("alice", "a@x.com", "pw").await.unwrap();

    let err = client.http().list(&Plants).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(api.last_request().authorization, None);

    client.login("a@x.com", "pw").await.unwrap();
    let first = client.session().token().unwrap();
    client.login("a@x.com", "pw").await.unwrap();
    let second = client.session().token().unwrap();
    assert_ne!(first, second);

    client.http().list(&Plants).await.unwrap();
    assert_eq!(
        api.last_request().authorization,
        Some(format!("Bearer {}", second))
    );
}

#[tokio::test]
async fn bodies_are_sent_as_json() {
    let api = FakeApi::start().await;
    let client = signed_in(&api).await;

    client
        .http()
        .create(
            &Tips,
            &TipDraft {
                title: "Mulch".into(),
                content: "Keeps roots cool".into(),
            },
        )
        .await
        .unwrap();
    let request = api.last_request();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/tips");
    assert_eq!(request.content_type.as_deref(), Some("application/json"));

    client.http().list(&Tips).await.unwrap();
    assert_eq!(api.last_request().content_type, None);
}

#[tokio::test]
async fn rejected_token_clears_the_session() {
    let api = FakeApi::start().await;
    let client = signed_in(&api).await;
    let plants = client.view(Plants);
    plants.mount().await.unwrap();

    api.expire_tokens();
    let err = plants.reload().await.unwrap_err();

    assert!(err.is_unauthorized());
    assert!(!client.is_signed_in());
    assert!(plants.login_required());
}

#[tokio::test]
async fn server_messages_are_surfaced() {
    let api = FakeApi::start().await;
    let client = GardenClient::connect(&api.base_url).unwrap();
    client.register("alice", "a@x.com", "pw").await.unwrap();

    let err = client
        .register("alice", "other@x.com", "pw")
        .await
        .unwrap_err();
    match err {
        GardenClientError::Http { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Username already exists");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let err = client.login("a@x.com", "wrong").await.unwrap_err();
    assert_eq!(err.to_string(), "Unauthorized: Invalid password");
}

#[tokio::test]
async fn malformed_payload_is_a_decode_error() {
    let api = FakeApi::start().await;
    let client = signed_in(&api).await;
    api.insert("plants", json!({"id": "not-a-number", "name": 5}));

    let plants = client.view(Plants);
    let err = plants.mount().await.unwrap_err();

    assert!(matches!(err, GardenClientError::Decode { ref path, .. } if path == "/plants"));
    assert!(matches!(plants.phase(), Phase::Error(_)));
}

#[tokio::test]
async fn validation_happens_before_any_request() {
    let api = FakeApi::start().await;
    let client = signed_in(&api).await;
    let before = api.request_count();

    let err = client
        .http()
        .create(&Plants, &PlantDraft::named("   "))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = client
        .http()
        .update(&Tips, 1, &TipPatch::default())
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(api.request_count(), before);
}

#[tokio::test]
async fn unreachable_server_is_a_network_failure() {
    let client = GardenClient::connect("http://127.0.0.1:1").unwrap();
    let err = client.http().list(&Plants).await.unwrap_err();
    assert!(matches!(err, GardenClientError::Network(_)));
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn care_schedules_are_nested_under_their_plant() {
    let api = FakeApi::start().await;
    let client = signed_in(&api).await;
    let plant = client
        .http()
        .create(&Plants, &PlantDraft::named("Tomato"))
        .await
        .unwrap()
        .into_entity()
        .unwrap();

    let today = Local::now().date_naive();
    let schedules = client.view(CareSchedules::for_plant(plant.id));
    schedules.mount().await.unwrap();
    schedules.open_add(CareScheduleDraft {
        plant_id: plant.id,
        task: CareTask::Watering,
        schedule_date: today,
        interval: Interval::Daily,
    });
    let created = schedules.submit().await.unwrap().into_entity().unwrap();

    assert_eq!(
        api.last_request().path,
        format!("/plants/{}/care_schedules", plant.id)
    );
    assert_eq!(created.plant_id, plant.id);
    assert!(created.is_due_on(today));

    let notices = client
        .due_notifier()
        .evaluate(&schedules.items(), today);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].schedule_id, created.id);
}

#[tokio::test]
async fn forum_posts_comments_replies_and_reactions() {
    let api = FakeApi::start().await;
    let client = signed_in(&api).await;

    let post = client
        .http()
        .create(
            &ForumPosts,
            &ForumPostDraft {
                title: "Aphids".into(),
                content: "How do I get rid of them?".into(),
            },
        )
        .await
        .unwrap()
        .into_entity()
        .unwrap();
    assert!(post.is_owner);
    assert_eq!(post.author.as_ref().map(|a| a.username.as_str()), Some("alice"));

    let comments = client.view(Comments::on_post(post.id));
    comments.mount().await.unwrap();
    comments.open_add(CommentDraft::new("Ladybugs"));
    let comment = comments.submit().await.unwrap().into_entity().unwrap();

    comments
        .open_edit(comment.id, CommentDraft::new("Ladybugs, lots of them"))
        .unwrap();
    comments.submit().await.unwrap();
    assert_eq!(comments.items()[0].content, "Ladybugs, lots of them");

    let reply = client
        .reply(post.id, comment.id, "Worked for me")
        .await
        .unwrap();
    assert_eq!(reply.content, "Worked for me");

    let reactions = client.react(post.id, ReactionKind::Like).await.unwrap();
    assert_eq!(reactions.like, 1);
    assert_eq!(reactions.dislike, 0);

    comments.request_delete(comment.id);
    comments.confirm_delete().await.unwrap();
    assert!(comments.items().is_empty());
}

#[tokio::test]
async fn layouts_keep_their_bed_structure() {
    let api = FakeApi::start().await;
    let client = signed_in(&api).await;

    let data = LayoutData::Beds(vec![Bed {
        name: "North".into(),
        plants: vec!["Basil".into(), "Sage".into()],
    }]);
    client
        .http()
        .create(
            &Layouts,
            &LayoutDraft {
                name: "Backyard".into(),
                layout_data: data.clone(),
            },
        )
        .await
        .unwrap();

    let layouts = client.http().list(&Layouts).await.unwrap();
    assert_eq!(layouts.len(), 1);
    assert_eq!(layouts[0].layout_data, data);
}

#[tokio::test]
async fn refresh_replaces_only_the_access_token() {
    let api = FakeApi::start().await;
    let client = signed_in(&api).await;
    let before = client.session().token().unwrap();

    let refreshed = client.refresh().await.unwrap();

    assert_ne!(refreshed, before);
    assert_eq!(client.session().token(), Some(refreshed.clone()));
    assert_eq!(client.session().username().as_deref(), Some("alice"));
    assert_eq!(
        api.last_request().authorization.as_deref().map(|h| h.starts_with("Bearer refresh-")),
        Some(true)
    );

    client.http().list(&Plants).await.unwrap();
}

#[tokio::test]
async fn logout_in_one_tab_signs_out_the_other() {
    let api = FakeApi::start().await;
    let storage: Arc<dyn SessionStorage> = Arc::new(MemoryStorage::new());
    let tab_a = GardenClient::new(
        ClientConfig::new(&api.base_url),
        SessionHolder::new(storage.clone()),
    )
    .unwrap();
    let tab_b = GardenClient::new(ClientConfig::new(&api.base_url), SessionHolder::new(storage))
        .unwrap();

    tab_a.register("alice", "a@x.com", "pw").await.unwrap();
    tab_a.login("a@x.com", "pw").await.unwrap();
    assert!(tab_b.is_signed_in());
    tab_b.http().list(&Plants).await.unwrap();

    let mut watcher = tab_b.session().watch();
    tab_a.logout().await.unwrap();

    assert_eq!(watcher.changed().await, Some(SessionChange::SignedOut));
    assert!(!tab_b.is_signed_in());
    assert!(tab_b.http().list(&Plants).await.unwrap_err().is_unauthorized());
    assert_eq!(api.last_request().authorization, None);
}
