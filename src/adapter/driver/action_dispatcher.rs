use crate::adapter::driver::request_dto::{ActionEnvelope, ActionRequest};
use crate::adapter::driver::response_dto::ActionResponse;
use crate::application::command::{AdjustStock, MovementHistoryQuery};
use crate::application::service::{InventoryQueryService, StockMovementService};
use crate::application::ApplicationError;
use crate::domain::context::RequestContext;
use std::sync::Arc;

/// アクションディスパッチャー
/// JSONで受け取った操作をアプリケーションサービスに振り分け、レスポンスに変換する
#[derive(Clone)]
pub struct ActionDispatcher {
    movements: Arc<StockMovementService>,
    queries: Arc<InventoryQueryService>,
}

impl ActionDispatcher {
    pub fn new(movements: Arc<StockMovementService>, queries: Arc<InventoryQueryService>) -> Self {
        Self { movements, queries }
    }

    /// 1行のJSONを処理する
    /// 解析できない入力は `InvalidArgument` のレスポンスにする
    pub async fn handle_line(&self, line: &str) -> ActionResponse {
        match serde_json::from_str::<ActionEnvelope>(line) {
            Ok(envelope) => self.dispatch(envelope).await,
            Err(e) => {
                tracing::warn!("Malformed action request: {}", e);
                ActionResponse::from_error(&ApplicationError::invalid_argument(
                    "request",
                    e.to_string(),
                ))
            }
        }
    }

    /// 操作を実行してレスポンスを作成
    pub async fn dispatch(&self, envelope: ActionEnvelope) -> ActionResponse {
        let mut ctx = RequestContext::new().with_actor(envelope.actor_id);
        if let Some(correlation_id) = envelope.correlation_id {
            ctx = ctx.with_correlation_id(correlation_id);
        }
        let action = envelope.action.name();

        match self.execute(&ctx, envelope.action).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(
                    correlation_id = %ctx.correlation_id(),
                    action,
                    kind = ?err.kind(),
                    "Action failed"
                );
                ActionResponse::from_error(&err)
            }
        }
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        action: ActionRequest,
    ) -> Result<ActionResponse, ApplicationError> {
        let response = match action {
            ActionRequest::Receive(request) => ActionResponse::from_outcome(
                &self.movements.receive(ctx, request.into_receive()).await?,
            ),
            ActionRequest::Dispatch(request) => ActionResponse::from_outcome(
                &self.movements.dispatch(ctx, request.into_dispatch()).await?,
            ),
            ActionRequest::Adjust(request) => ActionResponse::from_outcome(
                &self
                    .movements
                    .adjust(ctx, AdjustStock::try_from(request)?)
                    .await?,
            ),
            ActionRequest::Transfer(request) => ActionResponse::from_outcome(
                &self.movements.transfer(ctx, request.into()).await?,
            ),
            ActionRequest::Reserve(request) => ActionResponse::from_outcome(
                &self.movements.reserve(ctx, request.into_reserve()).await?,
            ),
            ActionRequest::Release(request) => ActionResponse::from_outcome(
                &self.movements.release(ctx, request.into_release()).await?,
            ),
            ActionRequest::UpdateQuantity(request) => ActionResponse::from_record(
                &self.movements.update_quantity(ctx, request.into()).await?,
            ),
            ActionRequest::Delete(request) => {
                ActionResponse::from_record(&self.movements.delete(ctx, request.into()).await?)
            }
            ActionRequest::GetInventory(request) => ActionResponse::from_record(
                &self
                    .queries
                    .get_inventory(request.product_batch_id, request.location_id)
                    .await?,
            ),
            ActionRequest::ByLocation(request) => ActionResponse::from_inventory_page(
                self.queries
                    .get_inventory_by_location(request.location_id, request.page, request.limit)
                    .await?,
            ),
            ActionRequest::ByBatch(request) => ActionResponse::from_inventory_page(
                self.queries
                    .get_inventory_by_batch(request.product_batch_id, request.page, request.limit)
                    .await?,
            ),
            ActionRequest::Movements(request) => ActionResponse::from_movement_page(
                self.queries
                    .get_movement_history(MovementHistoryQuery::try_from(request)?)
                    .await?,
            ),
        };
        Ok(response)
    }
}
