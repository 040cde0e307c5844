//! Reconciliation pipeline orchestration
//!
//! Drives the batch passes: incremental reconcile of paid orders, the
//! destructive full rebuild, placeholder refresh from the catalog, and the
//! chunked discount back-fill. One order is one co-booking group; a
//! malformed item is logged onto the session and never aborts its batch.

use rollcall_common::db::models::{
    ActivityType, BookingType, RosterRecord, WeekDay,
};
use rollcall_common::{text, Result};
use sqlx::SqlitePool;

use crate::catalog::CatalogStore;
use crate::commerce::{CommerceStore, Order, OrderItem};
use crate::discount::{self, GroupItem};
use crate::ledger::{self, event_signature};
use crate::resolve::{
    classify, keys, resolve_dates, AttributeChain, ClassifySignals, DateInputs, DateResolution,
};
use crate::retry::retry_on_lock;
use crate::session::{save_session, SyncError, SyncSession, SyncState};

/// Outcome of a placeholder refresh pass
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// One item prepared for the write phase
struct PreparedItem {
    record: RosterRecord,
    group_item: GroupItem,
}

pub struct Reconciler {
    db: SqlitePool,
    commerce: CommerceStore,
    catalog: CatalogStore,
}

impl Reconciler {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            commerce: CommerceStore::new(db.clone()),
            catalog: CatalogStore::new(db.clone()),
            db,
        }
    }

    // ------------------------------------------------------------------
    // Pass entry points
    // ------------------------------------------------------------------

    /// Incremental reconciliation of paid orders (all, or an explicit set)
    pub async fn run_reconcile(
        &self,
        mut session: SyncSession,
        order_ids: Option<Vec<i64>>,
    ) -> SyncSession {
        match self.reconcile_pass(&mut session, order_ids).await {
            Ok(processed) => {
                session.update_progress(
                    processed,
                    processed,
                    format!(
                        "Completed: {} orders reconciled, {} failures",
                        processed,
                        session.failure_count()
                    ),
                );
                session.transition_to(SyncState::Completed);
            }
            Err(err) => {
                tracing::error!(session_id = %session.session_id, error = %err, "Reconcile pass failed");
                let (current, total) = (session.progress.current, session.progress.total);
                session.update_progress(current, total, format!("Failed: {}", err));
                session.transition_to(SyncState::Failed);
            }
        }
        self.persist(&session).await;
        session
    }

    /// Destructive full rebuild inside one transaction
    pub async fn run_rebuild(&self, mut session: SyncSession) -> SyncSession {
        match self.rebuild_pass(&mut session).await {
            Ok(inserted) => {
                session.update_progress(
                    inserted,
                    inserted,
                    format!(
                        "Completed: ledger rebuilt with {} rows, {} failures",
                        inserted,
                        session.failure_count()
                    ),
                );
                session.transition_to(SyncState::Completed);
            }
            Err(err) => {
                // Transaction rolled back; prior ledger state is intact
                tracing::error!(session_id = %session.session_id, error = %err, "Rebuild failed, prior state kept");
                let (current, total) = (session.progress.current, session.progress.total);
                session.update_progress(current, total, format!("Failed: {}", err));
                session.transition_to(SyncState::Failed);
            }
        }
        self.persist(&session).await;
        session
    }

    /// Chunked discount back-fill over historical orders; resumable and
    /// idempotent (already-populated discount fields are skipped)
    pub async fn run_migration(&self, mut session: SyncSession, chunk_size: i64) -> SyncSession {
        match self.migration_pass(&mut session, chunk_size).await {
            Ok(migrated) => {
                let total = session.progress.total;
                session.update_progress(
                    total,
                    total,
                    format!(
                        "Completed: {} orders migrated, {} failures",
                        migrated,
                        session.failure_count()
                    ),
                );
                session.transition_to(SyncState::Completed);
            }
            Err(err) => {
                tracing::error!(session_id = %session.session_id, error = %err, "Discount migration failed");
                let (current, total) = (session.progress.current, session.progress.total);
                session.update_progress(current, total, format!("Failed: {}", err));
                session.transition_to(SyncState::Failed);
            }
        }
        self.persist(&session).await;
        session
    }

    /// Create or refresh placeholder rows for published bookable variants
    pub async fn refresh_placeholders(&self) -> Result<PlaceholderSummary> {
        let mut summary = PlaceholderSummary::default();

        for (variant, product) in self.catalog.published_variants().await? {
            let chain = AttributeChain::new(
                None,
                Some(&variant.attributes),
                Some(&product.attributes),
            );
            let camp_term = chain.resolve(keys::CAMP_TERMS);
            let course_day = chain.resolve(keys::COURSE_DAY);
            if camp_term.is_none() && course_day.is_none() {
                // Not a bookable event occurrence
                continue;
            }

            let record = self.build_placeholder(&chain, &variant, &product, camp_term, course_day);
            match ledger::upsert_placeholder(&self.db, &record).await? {
                ledger::UpsertOutcome::Inserted => summary.created += 1,
                ledger::UpsertOutcome::Updated => summary.updated += 1,
                ledger::UpsertOutcome::Skipped => summary.skipped += 1,
            }
        }

        tracing::info!(
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            "Placeholder refresh complete"
        );
        Ok(summary)
    }

    /// Remove every ledger row for a product that left the catalog
    pub async fn remove_product(&self, product_id: i64) -> Result<u64> {
        ledger::delete_by_product(&self.db, product_id).await
    }

    // ------------------------------------------------------------------
    // Pass bodies
    // ------------------------------------------------------------------

    async fn reconcile_pass(
        &self,
        session: &mut SyncSession,
        order_ids: Option<Vec<i64>>,
    ) -> Result<usize> {
        session.update_progress(0, 0, "Loading orders...".to_string());
        self.persist(session).await;

        let orders = match order_ids {
            Some(ids) => {
                let mut orders = Vec::new();
                for id in ids {
                    match self.commerce.order(id).await? {
                        Some(order) => orders.push(order),
                        None => session.record_error(SyncError {
                            order_id: Some(id),
                            order_item_id: None,
                            message: "order not found".to_string(),
                        }),
                    }
                }
                orders
            }
            None => self.commerce.paid_orders().await?,
        };

        session.transition_to(SyncState::Processing);
        let total = orders.len();
        tracing::info!(session_id = %session.session_id, orders = total, "Reconciling orders");

        for (index, order) in orders.iter().enumerate() {
            session.update_progress(index, total, format!("Reconciling order {}", order.id));
            self.persist(session).await;

            if let Err(err) = self.reconcile_order(order, session).await {
                session.record_error(SyncError {
                    order_id: Some(order.id),
                    order_item_id: None,
                    message: err.to_string(),
                });
            }
        }

        Ok(total)
    }

    /// Reconcile one order: resolve every item, attribute discounts across
    /// the co-booking group, then upsert and displace placeholders
    pub async fn reconcile_order(
        &self,
        order: &Order,
        session: &mut SyncSession,
    ) -> Result<()> {
        let items = self.commerce.items_for_order(order.id).await?;
        let mut prepared = Vec::new();

        for item in &items {
            match self.prepare_item(order, item).await {
                Ok(p) => prepared.push(p),
                Err(err) => session.record_error(SyncError {
                    order_id: Some(order.id),
                    order_item_id: Some(item.id),
                    message: err.to_string(),
                }),
            }
        }

        // Discounts are positional within the group, so they are computed
        // only after every resolvable item is in
        let group: Vec<GroupItem> = prepared.iter().map(|p| p.group_item.clone()).collect();
        let breakdowns = discount::attribute(&group, &order.coupons);

        for p in &mut prepared {
            let breakdown = breakdowns
                .get(&p.record.order_item_id)
                .cloned()
                .unwrap_or_default();
            let total = discount::total(&breakdown);
            let breakdown_json = serde_json::to_string(&breakdown).map_err(|e| {
                rollcall_common::Error::Internal(format!("Failed to serialize breakdown: {}", e))
            })?;

            if let Err(err) = self
                .commerce
                .write_item_discount(p.record.order_item_id, total, &breakdown_json)
                .await
            {
                session.record_error(SyncError {
                    order_id: Some(order.id),
                    order_item_id: Some(p.record.order_item_id),
                    message: format!("discount write-back failed: {}", err),
                });
            }

            p.record.discount_total = total;
            p.record.discount_breakdown = breakdown;
        }

        let max_wait =
            rollcall_common::db::get_setting_i64(&self.db, "database_max_lock_wait_ms", 5000)
                .await as u64;

        for p in &prepared {
            let outcome = retry_on_lock("roster upsert", max_wait, || {
                ledger::upsert_record(&self.db, &p.record)
            })
            .await;

            match outcome {
                Ok(_) => {
                    // A real booking displaces the matching empty-roster row
                    ledger::delete_by_signature(&self.db, &p.record.event_signature).await?;
                }
                Err(err) => session.record_error(SyncError {
                    order_id: Some(order.id),
                    order_item_id: Some(p.record.order_item_id),
                    message: err.to_string(),
                }),
            }
        }

        Ok(())
    }

    async fn rebuild_pass(&self, session: &mut SyncSession) -> Result<usize> {
        session.update_progress(0, 0, "Loading catalog and orders...".to_string());
        self.persist(session).await;

        // Placeholders first, from the published catalog
        let mut placeholders = Vec::new();
        for (variant, product) in self.catalog.published_variants().await? {
            let chain = AttributeChain::new(
                None,
                Some(&variant.attributes),
                Some(&product.attributes),
            );
            let camp_term = chain.resolve(keys::CAMP_TERMS);
            let course_day = chain.resolve(keys::COURSE_DAY);
            if camp_term.is_none() && course_day.is_none() {
                continue;
            }
            placeholders.push(self.build_placeholder(
                &chain,
                &variant,
                &product,
                camp_term,
                course_day,
            ));
        }

        // Then every paid order from source data
        let orders = self.commerce.paid_orders().await?;
        let total = orders.len();
        session.transition_to(SyncState::Processing);

        let mut records: Vec<RosterRecord> = Vec::new();
        for (index, order) in orders.iter().enumerate() {
            session.update_progress(index, total, format!("Rebuilding order {}", order.id));
            self.persist(session).await;

            let items = self.commerce.items_for_order(order.id).await?;
            let mut prepared = Vec::new();
            for item in &items {
                match self.prepare_item(order, item).await {
                    Ok(p) => prepared.push(p),
                    Err(err) => session.record_error(SyncError {
                        order_id: Some(order.id),
                        order_item_id: Some(item.id),
                        message: err.to_string(),
                    }),
                }
            }

            let group: Vec<GroupItem> = prepared.iter().map(|p| p.group_item.clone()).collect();
            let breakdowns = discount::attribute(&group, &order.coupons);
            for mut p in prepared {
                let breakdown = breakdowns
                    .get(&p.record.order_item_id)
                    .cloned()
                    .unwrap_or_default();
                p.record.discount_total = discount::total(&breakdown);
                p.record.discount_breakdown = breakdown;
                records.push(p.record);
            }
        }

        // Real bookings displace their placeholders before the single write
        let booked: std::collections::HashSet<&str> = records
            .iter()
            .map(|r| r.event_signature.as_str())
            .collect();
        let mut all: Vec<RosterRecord> = placeholders
            .into_iter()
            .filter(|p| !booked.contains(p.event_signature.as_str()))
            .collect();
        all.extend(records);

        session.transition_to(SyncState::Writing);
        self.persist(session).await;

        // Hard failure here rolls the transaction back and fails the pass
        let summary = ledger::rebuild_all(&self.db, &all).await?;
        Ok(summary.inserted)
    }

    async fn migration_pass(&self, session: &mut SyncSession, chunk_size: i64) -> Result<usize> {
        let total = self.commerce.unmigrated_order_count().await? as usize;
        session.transition_to(SyncState::Processing);
        session.update_progress(0, total, "Scanning for unmigrated orders...".to_string());
        self.persist(session).await;

        tracing::info!(
            session_id = %session.session_id,
            unmigrated = total,
            chunk_size,
            "Starting discount migration"
        );

        let mut migrated = 0usize;
        loop {
            // Each chunk commits independently; stopping between chunks is safe
            let order_ids = self.commerce.unmigrated_order_ids(chunk_size).await?;
            if order_ids.is_empty() {
                break;
            }

            for order_id in order_ids {
                match self.migrate_order(order_id, session).await {
                    Ok(()) => migrated += 1,
                    Err(err) => session.record_error(SyncError {
                        order_id: Some(order_id),
                        order_item_id: None,
                        message: err.to_string(),
                    }),
                }
            }

            session.update_progress(
                migrated.min(total),
                total,
                format!("Migrated {} of {} orders", migrated, total),
            );
            self.persist(session).await;
        }

        Ok(migrated)
    }

    /// Back-fill discounts for one historical order.
    ///
    /// Items whose discount fields are already populated are left alone,
    /// which is what makes re-running a chunk a no-op.
    async fn migrate_order(&self, order_id: i64, session: &mut SyncSession) -> Result<()> {
        let order = self.commerce.order(order_id).await?.ok_or_else(|| {
            rollcall_common::Error::NotFound(format!("order {}", order_id))
        })?;
        let items = self.commerce.items_for_order(order_id).await?;

        let mut prepared = Vec::new();
        for item in &items {
            match self.prepare_item(&order, item).await {
                Ok(p) => prepared.push((item.discount_total.is_none(), p)),
                Err(err) => session.record_error(SyncError {
                    order_id: Some(order_id),
                    order_item_id: Some(item.id),
                    message: err.to_string(),
                }),
            }
        }

        let group: Vec<GroupItem> = prepared.iter().map(|(_, p)| p.group_item.clone()).collect();
        let breakdowns = discount::attribute(&group, &order.coupons);

        for (needs_migration, p) in prepared {
            if !needs_migration {
                continue;
            }
            let breakdown = breakdowns
                .get(&p.record.order_item_id)
                .cloned()
                .unwrap_or_default();
            let total = discount::total(&breakdown);
            let breakdown_json = serde_json::to_string(&breakdown).map_err(|e| {
                rollcall_common::Error::Internal(format!("Failed to serialize breakdown: {}", e))
            })?;

            self.commerce
                .write_item_discount(p.record.order_item_id, total, &breakdown_json)
                .await?;
            ledger::update_pricing(&self.db, p.record.order_item_id, total, &breakdown_json)
                .await?;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Per-item normalization
    // ------------------------------------------------------------------

    /// Resolve, classify and date one booked item into a roster record
    async fn prepare_item(&self, order: &Order, item: &OrderItem) -> Result<PreparedItem> {
        let variant = if item.variant_id != 0 {
            self.catalog.variant(item.variant_id).await?
        } else {
            None
        };
        let product_id = if item.product_id != 0 {
            item.product_id
        } else {
            variant.as_ref().map(|v| v.product_id).unwrap_or(0)
        };
        let product = if product_id != 0 {
            self.catalog.product(product_id).await?
        } else {
            None
        };

        let chain = AttributeChain::new(
            Some(&item.attributes),
            variant.as_ref().map(|v| &v.attributes),
            product.as_ref().map(|p| &p.attributes),
        );

        let camp_term = chain.resolve(keys::CAMP_TERMS);
        let course_day = chain.resolve(keys::COURSE_DAY);
        let raw_activity = chain.resolve(keys::ACTIVITY_TYPE);
        let signals = ClassifySignals::for_variant(
            item.variant_id,
            course_day.is_some(),
            camp_term.is_some(),
        );
        let activity = classify(raw_activity.as_deref(), &signals);

        let venue = chain.resolve_or_unknown(keys::VENUE);
        let region = chain.resolve_or_unknown(keys::REGION);
        let age_group = chain.resolve_or_unknown(keys::AGE_GROUP);
        let season = chain.resolve(keys::SEASON).unwrap_or_default();
        let booking_type =
            BookingType::from(chain.resolve(keys::BOOKING_TYPE).unwrap_or_default());
        let selected_days = chain
            .resolve(keys::SELECTED_DAYS)
            .map(|raw| WeekDay::parse_list(&raw))
            .unwrap_or_default();

        let explicit_start = item.attributes.get_any(keys::START_DATE);
        let explicit_end = item.attributes.get_any(keys::END_DATE);
        let metadata_start = chain.resolve(keys::META_START_DATE);
        let metadata_end = chain.resolve(keys::META_END_DATE);
        let product_term = chain.resolve_from_catalog(keys::CAMP_TERMS);

        let mut record = RosterRecord::new();

        let inputs = DateInputs {
            explicit_start: explicit_start.as_deref(),
            explicit_end: explicit_end.as_deref(),
            term: camp_term.as_deref(),
            metadata_start: metadata_start.as_deref(),
            metadata_end: metadata_end.as_deref(),
            product_term: product_term.as_deref(),
            season: if season.is_empty() {
                None
            } else {
                Some(season.as_str())
            },
            order_date: order.created_at.map(|dt| dt.date_naive()),
            has_weekday_selection: !selected_days.is_empty(),
        };
        match resolve_dates(&inputs) {
            DateResolution::Resolved(resolved) => {
                record.start_date = resolved.start;
                record.end_date = resolved.end;
                record.date_confidence = resolved.confidence;
            }
            DateResolution::Unresolved => {
                tracing::debug!(
                    order_item_id = item.id,
                    "Event dates unresolved, keeping sentinel"
                );
            }
        }

        // Courses are identified by their day, camps by their term
        let term_or_day = match activity {
            ActivityType::Course => course_day.clone().or_else(|| camp_term.clone()),
            _ => camp_term.clone().or_else(|| course_day.clone()),
        }
        .unwrap_or_default();

        let player_name = chain.resolve(keys::PLAYER_NAME).unwrap_or_default();
        let player_key = if !player_name.is_empty() {
            text::canonical(&player_name)
        } else if !order.billing_email.is_empty() {
            text::canonical(&order.billing_email)
        } else {
            format!("order-{}", order.id)
        };

        record.order_id = order.id;
        record.order_item_id = item.id;
        record.product_id = product_id;
        record.variant_id = item.variant_id;
        record.event_signature = event_signature(
            &venue,
            &term_or_day,
            &age_group,
            &season,
            booking_type.label(),
        );
        record.player_name = player_name;
        record.player_age = chain.resolve(keys::PLAYER_AGE).unwrap_or_default();
        record.player_gender = chain.resolve(keys::PLAYER_GENDER).unwrap_or_default();
        record.parent_name = order.billing_name.clone();
        record.parent_email = order.billing_email.clone();
        record.parent_phone = order.billing_phone.clone();
        record.activity_type = activity.clone();
        record.activity_name = product
            .as_ref()
            .map(|p| p.name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| item.name.clone());
        record.venue = venue;
        record.region = region;
        record.age_group = age_group;
        record.season = season;
        record.booking_type = booking_type;
        record.course_day = course_day.unwrap_or_default();
        record.camp_term = camp_term.unwrap_or_default();
        record.selected_days = selected_days;
        record.base_price = item.subtotal;
        record.final_price = item.total;
        record.reimbursement = chain
            .resolve(keys::REIMBURSEMENT)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0.0);
        record.order_status = order.status.clone();
        record.order_date = order.created_at;

        let group_item = GroupItem {
            order_item_id: item.id,
            player: player_key,
            activity,
            price: item.subtotal,
        };

        Ok(PreparedItem { record, group_item })
    }

    /// Build the placeholder row for one published bookable variant
    fn build_placeholder(
        &self,
        chain: &AttributeChain<'_>,
        variant: &crate::catalog::Variant,
        product: &crate::catalog::Product,
        camp_term: Option<String>,
        course_day: Option<String>,
    ) -> RosterRecord {
        let raw_activity = chain.resolve(keys::ACTIVITY_TYPE);
        let signals = ClassifySignals::for_variant(
            variant.id,
            course_day.is_some(),
            camp_term.is_some(),
        );
        let activity = classify(raw_activity.as_deref(), &signals);

        let venue = chain.resolve_or_unknown(keys::VENUE);
        let region = chain.resolve_or_unknown(keys::REGION);
        let age_group = chain.resolve_or_unknown(keys::AGE_GROUP);
        let season = chain.resolve(keys::SEASON).unwrap_or_default();
        let booking_type =
            BookingType::from(chain.resolve(keys::BOOKING_TYPE).unwrap_or_default());

        let term_or_day = match activity {
            ActivityType::Course => course_day.clone().or_else(|| camp_term.clone()),
            _ => camp_term.clone().or_else(|| course_day.clone()),
        }
        .unwrap_or_default();

        let mut record = RosterRecord::new();
        record.is_placeholder = true;
        record.product_id = product.id;
        record.variant_id = variant.id;
        record.event_signature = event_signature(
            &venue,
            &term_or_day,
            &age_group,
            &season,
            booking_type.label(),
        );
        record.activity_type = activity;
        record.activity_name = product.name.clone();
        record.venue = venue;
        record.region = region;
        record.age_group = age_group;
        record.season = season.clone();

        let inputs = DateInputs {
            term: camp_term.as_deref(),
            season: if season.is_empty() {
                None
            } else {
                Some(season.as_str())
            },
            ..Default::default()
        };
        if let DateResolution::Resolved(resolved) = resolve_dates(&inputs) {
            record.start_date = resolved.start;
            record.end_date = resolved.end;
            record.date_confidence = resolved.confidence;
        }

        record.booking_type = booking_type;
        record.course_day = course_day.unwrap_or_default();
        record.camp_term = camp_term.unwrap_or_default();
        record
    }

    async fn persist(&self, session: &SyncSession) {
        if let Err(err) = save_session(&self.db, session).await {
            tracing::error!(
                session_id = %session.session_id,
                error = %err,
                "Failed to persist session state"
            );
        }
    }
}
