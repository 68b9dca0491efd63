//! End-to-end restore scenarios
//!
//! - Full replace into an empty scope
//! - Merge add of a document carrying real storage IDs
//! - Merge add of one new attachment next to existing ones
//! - Areas referencing unknown locations

mod common;

use common::*;
use stockroom_core::types::{AttachmentKind, EntityKind, RestoreStrategy};

/// The single-item document rewritten with the storage IDs of `scope`,
/// plus whatever extra image and invoice elements are given
async fn export_with_real_ids(h: &Harness, extra_images: &[String], invoices: &[String]) -> String {
    let scope = scope_a();
    let location = &h.locations(&scope).await[0];
    let area = &h.areas(&scope).await[0];
    let commodity = &h.commodities(&scope).await[0];
    let image = &h.attachments(&scope, AttachmentKind::Image).await[0];

    let mut images = vec![file_xml(&image.id, "photos/laptop.jpg", b"\xff\xd8jpeg")];
    images.extend_from_slice(extra_images);
    let mut attachments = section("images", &images);
    if !invoices.is_empty() {
        attachments.push_str(&section("invoices", invoices));
    }

    document(&[
        section("locations", &[location_xml(&location.id, "Home")]),
        section("areas", &[area_xml(&area.id, "Office", &location.id)]),
        section(
            "commodities",
            &[commodity_xml(&commodity.id, "Laptop", &area.id, &attachments)],
        ),
    ])
}

#[tokio::test]
async fn test_full_replace_into_empty_scope() {
    let h = Harness::new();
    let scope = scope_a();

    let stats = h
        .restore_ok(&scope, &single_item_document(), RestoreStrategy::FullReplace)
        .await;

    assert_eq!(stats.location_count, 1);
    assert_eq!(stats.area_count, 1);
    assert_eq!(stats.commodity_count, 1);
    assert_eq!(stats.image_count, 1);
    assert_eq!(stats.created_count, 3);
    assert_eq!(stats.error_count, 0, "errors: {:?}", stats.errors);
    assert_eq!(stats.binary_data_size, 6);

    assert_eq!(h.count(&scope, EntityKind::Location).await, 1);
    assert_eq!(h.count(&scope, EntityKind::Image).await, 1);
}

#[tokio::test]
async fn test_merge_add_with_real_ids_changes_nothing() {
    let h = Harness::new();
    let scope = scope_a();
    h.restore_ok(&scope, &single_item_document(), RestoreStrategy::FullReplace)
        .await;

    let doc = export_with_real_ids(&h, &[], &[]).await;
    let stats = h.restore_ok(&scope, &doc, RestoreStrategy::MergeAdd).await;

    assert_eq!(stats.created_count, 0);
    assert!(stats.skipped_count > 0);
    assert_eq!(stats.skipped_count, 4);
    assert_eq!(stats.image_count, 0);
    assert_eq!(stats.binary_data_size, 0, "existing image payload should not be read");
    assert_eq!(stats.error_count, 0, "errors: {:?}", stats.errors);

    for kind in [
        EntityKind::Location,
        EntityKind::Area,
        EntityKind::Commodity,
        EntityKind::Image,
    ] {
        assert_eq!(h.count(&scope, kind).await, 1, "{} count changed", kind);
    }
}

#[tokio::test]
async fn test_merge_add_links_new_image_to_existing_commodity() {
    let h = Harness::new();
    let scope = scope_a();

    let first = document(&[
        section("locations", &[location_xml("l1", "Home")]),
        section("areas", &[area_xml("a1", "Office", "l1")]),
        section(
            "commodities",
            &[commodity_xml(
                "c1",
                "Laptop",
                "a1",
                &format!(
                    "{}{}",
                    section("images", &[file_xml("img1", "photos/laptop.jpg", b"\xff\xd8jpeg")]),
                    section("invoices", &[file_xml("inv1", "receipt.pdf", b"%PDF-1.4")])
                ),
            )],
        ),
    ]);
    h.restore_ok(&scope, &first, RestoreStrategy::FullReplace).await;
    let invoice = h.attachments(&scope, AttachmentKind::Invoice).await[0].clone();

    let doc = export_with_real_ids(
        &h,
        &[file_xml("img-new", "photos/laptop-back.png", b"\x89PNG\r\n")],
        &[file_xml(&invoice.id, "receipt.pdf", b"%PDF-1.4")],
    )
    .await;
    let stats = h.restore_ok(&scope, &doc, RestoreStrategy::MergeAdd).await;

    assert_eq!(stats.image_count, 1);
    assert_eq!(stats.invoice_count, 0);
    assert_eq!(stats.created_count, 0);
    assert_eq!(stats.error_count, 0, "errors: {:?}", stats.errors);

    let commodity_id = h.commodities(&scope).await[0].id.clone();
    let images = h.attachments(&scope, AttachmentKind::Image).await;
    assert_eq!(images.len(), 2);
    assert!(images.iter().all(|i| i.commodity_id == commodity_id));
    assert_eq!(h.count(&scope, EntityKind::Invoice).await, 1);
}

#[tokio::test]
async fn test_area_with_unknown_location_is_rejected() {
    let h = Harness::new();
    let scope = scope_a();

    let doc = document(&[
        section("locations", &[location_xml("l1", "Home")]),
        section(
            "areas",
            &[
                area_xml("a1", "Office", "l1"),
                area_xml("a2", "Attic", "does-not-exist"),
            ],
        ),
    ]);
    let stats = h.restore_ok(&scope, &doc, RestoreStrategy::FullReplace).await;

    assert_eq!(stats.error_count, 1);
    assert!(
        stats.errors[0].contains("references non-existent location"),
        "unexpected error: {}",
        stats.errors[0]
    );
    assert!(stats.errors[0].starts_with("area a2"));
    assert_eq!(stats.area_count, 1);

    let areas = h.areas(&scope).await;
    assert_eq!(areas.len(), 1);
    assert_eq!(areas[0].name, "Office");
}
