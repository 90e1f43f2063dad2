use crate::discord::MessageTarget;
use crate::error::{DiscordError, WorkerError};
use crate::todo::{apply, render, TodoList};
use crate::types::{CommandArgs, WorkerRequest};
use crate::worker::Worker;

const NO_LIST: &str = "TODOリストがありません。先に `/list create` を実行してください。";

impl Worker {
    /// `/list create` and `/list add content:<text>`.
    pub(crate) async fn list_command(&self, request: &WorkerRequest, args: &CommandArgs) -> Result<(), WorkerError> {
        match args.sub_command() {
            Some("create") => self.create_list(request).await,
            Some("add") => {
                let content = args.str("content").unwrap_or_default().trim();
                if content.is_empty() {
                    return self.reply_error(request, "タスクの内容が空です").await;
                }
                self.add_item(request, content).await
            }
            _ => self.reply_error(request, "不明なサブコマンドです").await,
        }
    }

    async fn create_list(&self, request: &WorkerRequest) -> Result<(), WorkerError> {
        // Load list, keeping items from any earlier anchor
        let mut list = match self.store.get(&request.channel_id).await {
            Ok(list) => list,
            Err(e) => return self.reply_error(request, &format!("リストの取得に失敗しました: {e}")).await,
        };
        if list.has_anchor() {
            tracing::info!(
                channel_id = %request.channel_id,
                previous = %list.message_id,
                "replacing existing list message"
            );
        }

        // Post new anchor message
        let message = render(&list, 0, &self.codec).into_message();
        let message_id = match self.surface.send_message(&request.channel_id, &message).await {
            Ok(id) => id,
            Err(e) => return self.reply_error(request, &format!("リストの投稿に失敗しました: {e}")).await,
        };

        // Save list
        list.message_id = message_id;
        if let Err(e) = self.store.put(&list).await {
            return self.reply_error(request, &format!("リストの保存に失敗しました: {e}")).await;
        }

        tracing::info!(channel_id = %request.channel_id, message_id = %list.message_id, "list created");
        self.reply(request, "TODOリストを作成しました。").await?;
        Ok(())
    }

    async fn add_item(&self, request: &WorkerRequest, content: &str) -> Result<(), WorkerError> {
        // Load list
        let mut list = match self.store.get(&request.channel_id).await {
            Ok(list) => list,
            Err(e) => return self.reply_error(request, &format!("リストの取得に失敗しました: {e}")).await,
        };
        if !list.has_anchor() {
            return self.reply_error(request, NO_LIST).await;
        }

        // Append and save before touching the anchor
        let item_id = list.add_item(content).id.clone();
        if let Err(e) = self.store.put(&list).await {
            return self.reply_error(request, &format!("リストの保存に失敗しました: {e}")).await;
        }
        tracing::info!(channel_id = %request.channel_id, item_id = %item_id, "item added");

        // Update anchor message
        if let Err(e) = self.refresh_anchor(&list, 0).await {
            return self.reply_error(request, &format!("メッセージの更新に失敗しました: {e}")).await;
        }

        self.reply(request, format!("タスクを追加しました: {content}")).await?;
        Ok(())
    }

    /// A button press on a list message.
    pub(crate) async fn list_component(&self, request: &WorkerRequest, custom_id: &str) -> Result<(), WorkerError> {
        // Decode control
        let control = match self.codec.decode(custom_id) {
            Ok(control) => control,
            Err(e) => {
                tracing::warn!(interaction_id = %request.interaction_id, error = %e, "ignoring control");
                return Ok(());
            }
        };

        // Load list
        let mut list = match self.store.get(&request.channel_id).await {
            Ok(list) => list,
            Err(e) => return self.notify_error(request, &format!("リストの取得に失敗しました: {e}")).await,
        };
        if !list.has_anchor() {
            return self.notify_error(request, NO_LIST).await;
        }

        // Apply control, saving only when it changed the list
        let transition = apply(&mut list, &control);
        if transition.mutated {
            if let Err(e) = self.store.put(&list).await {
                return self.notify_error(request, &format!("リストの保存に失敗しました: {e}")).await;
            }
        }

        // Update anchor message
        if let Err(e) = self.refresh_anchor(&list, transition.target_page).await {
            return self.notify_error(request, &format!("メッセージの更新に失敗しました: {e}")).await;
        }
        Ok(())
    }

    async fn refresh_anchor(&self, list: &TodoList, page: i64) -> Result<(), DiscordError> {
        let target = MessageTarget::Channel {
            channel_id: list.channel_id.clone(),
            message_id: list.message_id.clone(),
        };
        let rendered = render(list, page, &self.codec);
        tracing::debug!(channel_id = %list.channel_id, page = rendered.page, "re-rendering list");
        self.surface.edit_message(&target, &rendered.into_message()).await
    }
}
