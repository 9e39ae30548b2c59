mod common;

use axum::http::StatusCode;
use blogicum::{MockStorageService, repository::Repository, visibility::PostFilter};
use chrono::Utc;
use common::{
    body_text, redirect_target, spawn_app, spawn_app_failing_post_writes, spawn_app_with_storage,
};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

fn post_fields<'a>(title: &'a str, category: &'a str) -> Vec<(&'a str, &'a str)> {
    vec![
        ("title", title),
        ("text", "Line one\nLine two"),
        ("pub_date", "2024-05-01T10:30"),
        ("category", category),
        ("location", ""),
    ]
}

#[tokio::test]
async fn anonymous_writers_are_sent_to_login() {
    let app = spawn_app();
    let response = app.get("/posts/create/", None).await;
    assert_eq!(redirect_target(&response), "/auth/login/?next=/posts/create/");

    let response = app.get("/edit_profile/", None).await;
    assert_eq!(redirect_target(&response), "/auth/login/?next=/edit_profile/");
}

#[tokio::test]
async fn create_post_with_image() {
    let app = spawn_app();
    let author = app.user("leo").await;
    let category = app.category("news", true).await;
    let category_id = category.id.to_string();

    let form = app.get("/posts/create/", Some(author.id)).await;
    assert_eq!(form.status(), StatusCode::OK);
    assert!(body_text(form).await.contains("multipart/form-data"));

    let response = app
        .post_multipart(
            "/posts/create/",
            Some(author.id),
            &post_fields("Fresh post", &category_id),
            Some(("cover.png", "image/png", PNG)),
        )
        .await;
    assert_eq!(redirect_target(&response), "/profile/leo/");

    let keys = app.storage.stored_keys();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("posts/") && keys[0].ends_with(".png"));

    let html = body_text(app.get("/", None).await).await;
    assert!(html.contains("Fresh post"));
    // Slashes are entity-escaped in the rendered attribute; the file name is enough.
    let file_name = keys[0].trim_start_matches("posts/");
    assert!(html.contains(file_name));
}

#[tokio::test]
async fn invalid_post_form_is_rerendered_with_errors() {
    let app = spawn_app();
    let author = app.user("leo").await;
    app.category("news", true).await;

    let response = app
        .post_multipart("/posts/create/", Some(author.id), &post_fields("", "9999"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("This field is required."));
    assert!(html.contains("Select a valid choice."));

    let filter = PostFilter {
        published_only: false,
        ..PostFilter::public(Utc::now())
    };
    assert_eq!(app.repo.count_posts(&filter).await.unwrap(), 0);
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let app = spawn_app();
    let author = app.user("leo").await;
    let category = app.category("news", true).await;
    let category_id = category.id.to_string();

    let response = app
        .post_multipart(
            "/posts/create/",
            Some(author.id),
            &post_fields("With script", &category_id),
            Some(("evil.sh", "text/x-shellscript", &b"rm -rf /"[..])),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Upload a valid image."));
    assert!(app.storage.stored_keys().is_empty());
}

#[tokio::test]
async fn storage_failure_is_a_server_error() {
    let app = spawn_app_with_storage(MockStorageService::new_failing());
    let author = app.user("leo").await;
    let category = app.category("news", true).await;
    let category_id = category.id.to_string();

    let response = app
        .post_multipart(
            "/posts/create/",
            Some(author.id),
            &post_fields("Doomed", &category_id),
            Some(("cover.png", "image/png", PNG)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn failed_database_write_discards_the_uploaded_image() {
    let app = spawn_app_failing_post_writes();
    let author = app.user("leo").await;
    let category = app.category("news", true).await;
    let category_id = category.id.to_string();

    let response = app
        .post_multipart(
            "/posts/create/",
            Some(author.id),
            &post_fields("Lost", &category_id),
            Some(("cover.png", "image/png", PNG)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.storage.stored_keys().is_empty());

    let post = app.post(&author, &category, "Existing", 1).await;
    let response = app
        .post_multipart(
            &format!("/posts/{}/edit/", post.id),
            Some(author.id),
            &post_fields("Renamed", &category_id),
            Some(("cover.png", "image/png", PNG)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.storage.stored_keys().is_empty());
    assert_eq!(app.repo.get_post(post.id).await.unwrap().unwrap().title, "Existing");
}

#[tokio::test]
async fn author_edits_post_and_keeps_image() {
    let app = spawn_app();
    let author = app.user("leo").await;
    let category = app.category("news", true).await;
    let category_id = category.id.to_string();
    app.post_multipart(
        "/posts/create/",
        Some(author.id),
        &post_fields("Draft title", &category_id),
        Some(("cover.png", "image/png", PNG)),
    )
    .await;
    let filter = PostFilter::public(Utc::now()).by_author(author.id);
    let post = app.repo.list_posts(&filter, 10, 0).await.unwrap().remove(0);

    let edit_uri = format!("/posts/{}/edit/", post.id);
    let form = body_text(app.get(&edit_uri, Some(author.id)).await).await;
    assert!(form.contains("value=\"Draft title\""));

    let response = app
        .post_multipart(&edit_uri, Some(author.id), &post_fields("Final title", &category_id), None)
        .await;
    assert_eq!(redirect_target(&response), format!("/posts/{}/", post.id));

    let updated = app.repo.get_post(post.id).await.unwrap().unwrap();
    assert_eq!(updated.title, "Final title");
    assert_eq!(updated.image, post.image);
    assert!(updated.image.is_some());
}

#[tokio::test]
async fn other_users_cannot_edit_or_delete_a_post() {
    let app = spawn_app();
    let author = app.user("leo").await;
    let intruder = app.user("anna").await;
    let category = app.category("news", true).await;
    let post = app.post(&author, &category, "Mine", 1).await;
    let category_id = category.id.to_string();
    let detail = format!("/posts/{}/", post.id);

    let edit_uri = format!("/posts/{}/edit/", post.id);
    assert_eq!(redirect_target(&app.get(&edit_uri, Some(intruder.id)).await), detail);
    let response = app
        .post_multipart(&edit_uri, Some(intruder.id), &post_fields("Theirs", &category_id), None)
        .await;
    assert_eq!(redirect_target(&response), detail);

    let delete_uri = format!("/posts/{}/delete/", post.id);
    let response = app.post_form(&delete_uri, Some(intruder.id), "").await;
    assert_eq!(redirect_target(&response), detail);

    let stored = app.repo.get_post(post.id).await.unwrap().expect("post still exists");
    assert_eq!(stored.title, "Mine");
}

#[tokio::test]
async fn deleting_a_post_removes_its_comments() {
    let app = spawn_app();
    let author = app.user("leo").await;
    let reader = app.user("anna").await;
    let category = app.category("news", true).await;
    let post = app.post(&author, &category, "Short lived", 1).await;
    let comment = app
        .repo
        .add_comment(post.id, reader.id, "Nice".into())
        .await
        .unwrap();

    let delete_uri = format!("/posts/{}/delete/", post.id);
    let confirm = body_text(app.get(&delete_uri, Some(author.id)).await).await;
    assert!(confirm.contains("Short lived"));

    let response = app.post_form(&delete_uri, Some(author.id), "").await;
    assert_eq!(redirect_target(&response), "/");
    assert!(app.repo.get_post(post.id).await.unwrap().is_none());
    assert!(app.repo.get_comment(post.id, comment.id).await.unwrap().is_none());
}

// --- Comments ---

#[tokio::test]
async fn comments_are_added_and_counted() {
    let app = spawn_app();
    let author = app.user("leo").await;
    let reader = app.user("anna").await;
    let category = app.category("news", true).await;
    let post = app.post(&author, &category, "Discuss", 1).await;

    let uri = format!("/posts/{}/add_comment/", post.id);
    let response = app.post_form(&uri, Some(reader.id), "text=Great+read").await;
    assert_eq!(redirect_target(&response), format!("/posts/{}/", post.id));

    let blank = app.post_form(&uri, Some(reader.id), "text=+++").await;
    assert_eq!(blank.status(), StatusCode::OK);
    assert!(body_text(blank).await.contains("This field is required."));

    let html = body_text(app.get(&format!("/posts/{}/", post.id), None).await).await;
    assert!(html.contains("Great read"));
    assert!(html.contains("Comments (1)"));

    let index = body_text(app.get("/", None).await).await;
    assert!(index.contains("Comments (1)"));
}

#[tokio::test]
async fn commenting_on_hidden_post_is_404() {
    let app = spawn_app();
    let author = app.user("leo").await;
    let reader = app.user("anna").await;
    let category = app.category("news", true).await;
    let post = app.post(&author, &category, "Secret", 1).await;
    app.repo.set_post_published(post.id, false).await.unwrap();

    let uri = format!("/posts/{}/add_comment/", post.id);
    let response = app.post_form(&uri, Some(reader.id), "text=Hello").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.repo.list_comments(post.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn only_the_author_changes_a_comment() {
    let app = spawn_app();
    let author = app.user("leo").await;
    let commenter = app.user("anna").await;
    let category = app.category("news", true).await;
    let post = app.post(&author, &category, "Discuss", 1).await;
    let comment = app
        .repo
        .add_comment(post.id, commenter.id, "Original".into())
        .await
        .unwrap();
    let detail = format!("/posts/{}/", post.id);
    let edit_uri = format!("/posts/{}/edit_comment/{}/", post.id, comment.id);
    let delete_uri = format!("/posts/{}/delete_comment/{}/", post.id, comment.id);

    // The post's author is not the comment's author.
    assert_eq!(redirect_target(&app.get(&edit_uri, Some(author.id)).await), detail);
    let response = app.post_form(&edit_uri, Some(author.id), "text=Hijacked").await;
    assert_eq!(redirect_target(&response), detail);
    let response = app.post_form(&delete_uri, Some(author.id), "").await;
    assert_eq!(redirect_target(&response), detail);

    let stored = app.repo.get_comment(post.id, comment.id).await.unwrap().unwrap();
    assert_eq!(stored.text, "Original");

    let response = app.post_form(&edit_uri, Some(commenter.id), "text=Edited").await;
    assert_eq!(redirect_target(&response), detail);
    let stored = app.repo.get_comment(post.id, comment.id).await.unwrap().unwrap();
    assert_eq!(stored.text, "Edited");

    let response = app.post_form(&delete_uri, Some(commenter.id), "").await;
    assert_eq!(redirect_target(&response), detail);
    assert!(app.repo.get_comment(post.id, comment.id).await.unwrap().is_none());
}

#[tokio::test]
async fn comment_must_belong_to_the_post_in_the_url() {
    let app = spawn_app();
    let author = app.user("leo").await;
    let category = app.category("news", true).await;
    let first = app.post(&author, &category, "First", 1).await;
    let second = app.post(&author, &category, "Second", 1).await;
    let comment = app
        .repo
        .add_comment(first.id, author.id, "On first".into())
        .await
        .unwrap();

    let uri = format!("/posts/{}/edit_comment/{}/", second.id, comment.id);
    assert_eq!(app.get(&uri, Some(author.id)).await.status(), StatusCode::NOT_FOUND);
}
