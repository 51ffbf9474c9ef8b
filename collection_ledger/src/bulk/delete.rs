//! Delete pipeline: deleting cards → deleting deck → complete

use super::progress::scaled;
use super::{
    BulkOperationController, DeleteReport, DeleteRequest, OperationOutcome, OperationReport,
    ProgressReporter, RunContext,
};
use crate::checkpoint::{Checkpoint, CheckpointPort, DeleteCheckpoint, DeleteStage, OperationKind};
use crate::containers;
use crate::error::{BulkError, BulkResult, LedgerError};
use crate::ledger;
use mtg_common::CardCatalog;

fn report(state: &DeleteCheckpoint, degraded: bool) -> DeleteReport {
    DeleteReport {
        container_id: state.container_id,
        container_name: state.container_name.clone(),
        card_count: state.card_count,
        succeeded: state.succeeded,
        failed: state.failed,
        checkpoint_degraded: degraded,
    }
}

impl<C: CardCatalog, P: CheckpointPort> BulkOperationController<C, P> {
    pub(super) async fn start_delete(
        &self,
        request: DeleteRequest,
        progress: &dyn ProgressReporter,
    ) -> BulkResult<OperationOutcome> {
        let (container, card_ids) = {
            let conn = self.db.lock().await;
            let container = containers::get_container(&conn, request.container_id)?
                .ok_or_else(|| {
                    BulkError::FatalStageFailure(format!(
                        "Container {} not found",
                        request.container_id
                    ))
                })?;
            let card_ids = if request.delete_cards {
                containers::owned_card_ids_in_container(&conn, container.id)?
            } else {
                Vec::new()
            };
            (container, card_ids)
        };

        log::info!(
            "Deleting '{}' ({} cards to remove)",
            container.name,
            card_ids.len()
        );
        let mut state =
            DeleteCheckpoint::new(container.id, &container.name, request.delete_cards, card_ids);
        let mut ctx = RunContext::new(progress);
        ctx.update(0, &format!("Deleting '{}'", state.container_name));
        self.save_delete(&mut state, &mut ctx).await?;
        self.run_delete(state, ctx).await
    }

    pub(super) async fn resume_delete(
        &self,
        mut state: DeleteCheckpoint,
        progress: &dyn ProgressReporter,
    ) -> BulkResult<OperationOutcome> {
        if state.stage == DeleteStage::Error {
            state.stage = state.failed_stage.unwrap_or(DeleteStage::DeletingCards);
            state.error = None;
            log::info!("Re-entering delete at stage {}", state.stage.as_str());
        }
        self.run_delete(state, RunContext::new(progress)).await
    }

    async fn run_delete(
        &self,
        mut state: DeleteCheckpoint,
        mut ctx: RunContext<'_>,
    ) -> BulkResult<OperationOutcome> {
        loop {
            let stage = state.stage;
            let result = match stage {
                DeleteStage::DeletingCards => self.delete_cards(&mut state, &mut ctx).await,
                DeleteStage::DeletingDeck => self.delete_deck(&mut state, &mut ctx).await,
                DeleteStage::Complete => break,
                DeleteStage::Error => Err(BulkError::MissingPayload(stage.as_str().to_string())),
            };
            if let Err(e) = result {
                return Ok(self.fail_delete(state, stage, e, &mut ctx).await);
            }
        }

        self.clear_checkpoint(OperationKind::Delete).await;
        let report = report(&state, ctx.degraded);
        let message = format!(
            "Deleted '{}': {} of {} cards removed, {} failed",
            report.container_name, report.succeeded, report.card_count, report.failed
        );
        log::info!("{}", message);
        ctx.progress.complete(&message);
        Ok(OperationOutcome::Completed(OperationReport::Delete(report)))
    }

    async fn fail_delete(
        &self,
        mut state: DeleteCheckpoint,
        stage: DeleteStage,
        error: BulkError,
        ctx: &mut RunContext<'_>,
    ) -> OperationOutcome {
        let message = format!("Delete failed while {}: {}", stage.as_str(), error);
        log::error!("{}", message);
        state.failed_stage = Some(stage);
        state.stage = DeleteStage::Error;
        state.error = Some(error.to_string());
        if let Err(e) = self.save_delete(&mut state, ctx).await {
            log::error!("Could not record delete failure: {}", e);
        }
        ctx.progress.error(&message);
        OperationOutcome::Failed {
            stage: stage.as_str().to_string(),
            message: error.to_string(),
        }
    }

    async fn save_delete(&self, state: &mut DeleteCheckpoint, ctx: &mut RunContext<'_>) -> BulkResult<()> {
        let mut record = Checkpoint::Delete(state.clone());
        self.persist(&mut record, ctx).await?;
        state.version = record.version();
        Ok(())
    }

    /// Retire the remaining cards in batches, saving the rest after each batch
    async fn delete_cards(&self, state: &mut DeleteCheckpoint, ctx: &mut RunContext<'_>) -> BulkResult<()> {
        if state.card_ids_stripped {
            let conn = self.db.lock().await;
            state.card_ids = containers::owned_card_ids_in_container(&conn, state.container_id)?;
            state.card_ids_stripped = false;
            log::info!(
                "Recomputed {} remaining cards of '{}'",
                state.card_ids.len(),
                state.container_name
            );
        }

        let batch_size = self.config.delete_batch_size.max(1);
        while !state.card_ids.is_empty() {
            let take = batch_size.min(state.card_ids.len());
            let batch: Vec<i64> = state.card_ids[..take].to_vec();
            {
                let mut conn = self.db.lock().await;
                for card_id in &batch {
                    match ledger::retire_card(&mut conn, *card_id, Some(state.container_id)) {
                        Ok(_) => state.succeeded += 1,
                        Err(LedgerError::CardNotFound(_)) => {
                            log::debug!("Card {} already deleted", card_id);
                            state.succeeded += 1;
                        }
                        Err(e) => {
                            log::warn!("Failed to delete card {}: {}", card_id, e);
                            state.failed += 1;
                        }
                    }
                }
            }
            state.card_ids.drain(..take);

            self.save_delete(state, ctx).await?;
            let done = state.succeeded + state.failed;
            ctx.update(
                scaled(0, 90, done, state.card_count),
                &format!("Deleted {} of {} cards", done, state.card_count),
            );
        }

        state.stage = DeleteStage::DeletingDeck;
        self.save_delete(state, ctx).await
    }

    async fn delete_deck(&self, state: &mut DeleteCheckpoint, ctx: &mut RunContext<'_>) -> BulkResult<()> {
        ctx.update(95, &format!("Deleting '{}'", state.container_name));
        let removed = {
            let mut conn = self.db.lock().await;
            ledger::remove_container(&mut conn, state.container_id)?
        };
        if !removed {
            log::info!("Container {} was already deleted", state.container_id);
        }
        state.stage = DeleteStage::Complete;
        self.save_delete(state, ctx).await
    }
}
