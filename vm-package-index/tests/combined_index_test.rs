//! Combined index tests
//!
//! Local releases mask the upstream index; everything else falls through to
//! the cached remote index.

use anyhow::Result;
use bytes::Bytes;
use vm_package_index::{IndexError, Metadata, Origin, PackageIndex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{create_test_setup, create_test_setup_with, make_sdist, quoted_base};

#[tokio::test]
async fn test_upload_then_serve_locally() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    let setup = create_test_setup(&format!("{}/simple", server.uri()))?;
    let index = &setup.state.index;
    let sdist = make_sdist("example", "1.0")?;

    index
        .upload_distribution("example-1.0.tar.gz", Bytes::from(sdist.clone()))
        .await?;

    let listing = index.get_versions("example").await?;
    assert_eq!(listing.len(), 1);
    assert_eq!(listing["example-1.0.tar.gz"], "/local/example-1.0.tar.gz");

    let distribution = index
        .get_distribution("/local/example-1.0.tar.gz", Origin::Local)
        .await?;
    assert_eq!(distribution.data.as_ref(), sdist.as_slice());
    assert_eq!(distribution.content_type, "application/x-gzip");

    let metadata = index.get_metadata("example", "1.0").await?.unwrap();
    assert_eq!(metadata.version(), Some("1.0"));
    assert_eq!(index.get_projects().await?, ["example"]);
    Ok(())
}

#[tokio::test]
async fn test_unknown_project_falls_through_to_remote() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/requests"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<a href="../packages/requests-2.0.tar.gz">requests-2.0.tar.gz</a>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    let setup = create_test_setup(&format!("{}/simple", server.uri()))?;
    let index = &setup.state.index;

    let listing = index.get_versions("requests").await?;
    assert_eq!(
        listing["requests-2.0.tar.gz"],
        format!(
            "/remote/packages/requests-2.0.tar.gz?base={}",
            quoted_base(&server.uri())
        )
    );
    assert!(index.get_metadata("requests", "2.0").await?.is_none());
    assert!(index.get_projects().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_local_release_masks_remote() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/example"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<a href="../packages/example-9.0.tar.gz">example-9.0.tar.gz</a>"#,
        ))
        .expect(0)
        .mount(&server)
        .await;
    let setup = create_test_setup(&format!("{}/simple", server.uri()))?;
    let index = &setup.state.index;

    index
        .upload_distribution("example-1.0.tar.gz", Bytes::from(make_sdist("example", "1.0")?))
        .await?;

    let listing = index.get_versions("Example").await?;
    assert_eq!(listing.keys().collect::<Vec<_>>(), ["example-1.0.tar.gz"]);
    Ok(())
}

#[tokio::test]
async fn test_sorted_versions_orders_by_version() -> Result<()> {
    let setup = create_test_setup("http://127.0.0.1:9/simple")?;
    let index = &setup.state.index;

    for version in ["1.10", "1.2", "1.2rc1"] {
        index
            .upload_distribution(
                &format!("example-{version}.tar.gz"),
                Bytes::from(make_sdist("example", version)?),
            )
            .await?;
    }

    let sorted = index.sorted_versions("example").await?;
    let filenames: Vec<&str> = sorted.iter().map(|(filename, _)| filename.as_str()).collect();
    assert_eq!(
        filenames,
        ["example-1.2rc1.tar.gz", "example-1.2.tar.gz", "example-1.10.tar.gz"]
    );
    assert_eq!(sorted[0].1, "/local/example-1.2rc1.tar.gz");
    Ok(())
}

#[tokio::test]
async fn test_history_is_bounded() -> Result<()> {
    let setup = create_test_setup_with("http://127.0.0.1:9/simple", |config| {
        config.history.size = 2;
    })?;
    let index = &setup.state.index;

    for version in ["1.0", "1.1", "1.2"] {
        index
            .upload_distribution(
                &format!("example-{version}.tar.gz"),
                Bytes::from(make_sdist("example", version)?),
            )
            .await?;
    }

    assert_eq!(index.history().all().await?, ["example/1.2", "example/1.1"]);

    index.remove_version("example", "1.2").await?;
    assert_eq!(index.history().all().await?, ["example/1.1"]);
    Ok(())
}

#[tokio::test]
async fn test_validate_metadata() -> Result<()> {
    let setup = create_test_setup("http://127.0.0.1:9/simple")?;
    let index = &setup.state.index;

    let complete: Metadata = [("name", "example"), ("version", "1.0")]
        .into_iter()
        .map(|(key, value)| (key, serde_json::Value::from(value)))
        .collect();
    assert!(index.validate_metadata(&complete).await?);

    let partial: Metadata = [("name", serde_json::Value::from("example"))]
        .into_iter()
        .collect();
    assert!(!index.validate_metadata(&partial).await?);
    Ok(())
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() -> Result<()> {
    let setup = create_test_setup_with("http://127.0.0.1:9/simple", |config| {
        config.limits.max_upload_size_mb = 0;
    })?;

    let result = setup
        .state
        .index
        .upload_distribution("example-1.0.tar.gz", Bytes::from(make_sdist("example", "1.0")?))
        .await;
    assert!(matches!(result, Err(IndexError::UploadTooLarge { .. })));
    Ok(())
}
