//! Exactly-once answering of callback queries.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use switchyard_core::{
    ApiResult, Bot, BotCommand, BoxedBot, CallbackAnswer, ChatId, InlineKeyboard, Message,
    MessageId, SendOptions,
};
use tracing::debug;

/// A [`Bot`] handed to everything that runs for one callback query.
///
/// Forwards every call to the underlying transport, except that once an
/// answer to the tracked query is in flight or has succeeded, further answers
/// to it are dropped. The dispatcher calls [`ensure_answered`](Self::ensure_answered)
/// at the end of each callback path, so a query ends up answered exactly once
/// whether the handler, the response or the dispatcher got there first.
pub(crate) struct AnsweringBot {
    inner: BoxedBot,
    query_id: String,
    answered: AtomicBool,
}

impl AnsweringBot {
    pub(crate) fn new(inner: BoxedBot, query_id: impl Into<String>) -> Self {
        Self {
            inner,
            query_id: query_id.into(),
            answered: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_answered(&self) -> bool {
        self.answered.load(Ordering::SeqCst)
    }

    /// Issues the empty acknowledgment unless the query was already answered.
    pub(crate) async fn ensure_answered(&self) -> ApiResult<()> {
        if self.is_answered() {
            return Ok(());
        }
        self.answer_callback_query(&self.query_id, &CallbackAnswer::empty())
            .await
    }
}

#[async_trait]
impl Bot for AnsweringBot {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        options: &SendOptions,
    ) -> ApiResult<Message> {
        self.inner.send_message(chat_id, text, options).await
    }

    async fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        reply_markup: Option<&InlineKeyboard>,
    ) -> ApiResult<()> {
        self.inner
            .edit_message_text(chat_id, message_id, text, reply_markup)
            .await
    }

    async fn send_sticker(
        &self,
        chat_id: ChatId,
        sticker: &str,
        options: &SendOptions,
    ) -> ApiResult<Message> {
        self.inner.send_sticker(chat_id, sticker, options).await
    }

    async fn answer_callback_query(
        &self,
        query_id: &str,
        answer: &CallbackAnswer,
    ) -> ApiResult<()> {
        if query_id != self.query_id {
            return self.inner.answer_callback_query(query_id, answer).await;
        }
        if self
            .answered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(query_id, "Callback query already answered, dropping answer");
            return Ok(());
        }
        // A failed answer releases the slot so a later call can retry.
        if let Err(e) = self.inner.answer_callback_query(query_id, answer).await {
            self.answered.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    async fn set_my_commands(&self, commands: &[BotCommand]) -> ApiResult<()> {
        self.inner.set_my_commands(commands).await
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        Arc::clone(&self.inner).as_any()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::downcast_bot;
    use switchyard_core::testing::RecordingBot;

    #[tokio::test]
    async fn test_second_answer_is_dropped() {
        let recorder = RecordingBot::shared();
        let bot = AnsweringBot::new(recorder.clone(), "q1");

        bot.answer_callback_query("q1", &CallbackAnswer::notice("done"))
            .await
            .unwrap();
        bot.ensure_answered().await.unwrap();
        bot.answer_callback_query("q1", &CallbackAnswer::empty())
            .await
            .unwrap();

        assert_eq!(recorder.answer_count(), 1);
    }

    #[tokio::test]
    async fn test_ensure_answered_acknowledges_once() {
        let recorder = RecordingBot::shared();
        let bot = AnsweringBot::new(recorder.clone(), "q1");

        bot.ensure_answered().await.unwrap();
        bot.ensure_answered().await.unwrap();

        assert!(bot.is_answered());
        assert_eq!(recorder.answer_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_answer_can_be_retried() {
        let recorder = RecordingBot::shared();
        let bot = AnsweringBot::new(recorder.clone(), "q1");

        recorder.set_fail_answers(true);
        assert!(bot.ensure_answered().await.is_err());
        assert!(!bot.is_answered());

        recorder.set_fail_answers(false);
        bot.ensure_answered().await.unwrap();
        assert_eq!(recorder.answer_count(), 1);
    }

    #[tokio::test]
    async fn test_other_queries_pass_through() {
        let recorder = RecordingBot::shared();
        let bot = AnsweringBot::new(recorder.clone(), "q1");

        bot.ensure_answered().await.unwrap();
        bot.answer_callback_query("q2", &CallbackAnswer::empty())
            .await
            .unwrap();

        assert_eq!(recorder.answer_count(), 2);
    }

    /// Suspends inside every answer so concurrent callers interleave.
    struct SlowAnswers(Arc<RecordingBot>);

    #[async_trait]
    impl Bot for SlowAnswers {
        fn id(&self) -> &str {
            self.0.id()
        }

        async fn send_message(
            &self,
            chat_id: ChatId,
            text: &str,
            options: &SendOptions,
        ) -> ApiResult<Message> {
            self.0.send_message(chat_id, text, options).await
        }

        async fn edit_message_text(
            &self,
            chat_id: ChatId,
            message_id: MessageId,
            text: &str,
            reply_markup: Option<&InlineKeyboard>,
        ) -> ApiResult<()> {
            self.0
                .edit_message_text(chat_id, message_id, text, reply_markup)
                .await
        }

        async fn send_sticker(
            &self,
            chat_id: ChatId,
            sticker: &str,
            options: &SendOptions,
        ) -> ApiResult<Message> {
            self.0.send_sticker(chat_id, sticker, options).await
        }

        async fn answer_callback_query(
            &self,
            query_id: &str,
            answer: &CallbackAnswer,
        ) -> ApiResult<()> {
            tokio::task::yield_now().await;
            self.0.answer_callback_query(query_id, answer).await
        }

        async fn set_my_commands(&self, commands: &[BotCommand]) -> ApiResult<()> {
            self.0.set_my_commands(commands).await
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    #[tokio::test]
    async fn test_concurrent_answers_reach_transport_once() {
        let recorder = RecordingBot::shared();
        let bot = AnsweringBot::new(Arc::new(SlowAnswers(recorder.clone())), "q1");

        let notice = CallbackAnswer::notice("done");
        let (handler, dispatcher) = tokio::join!(
            bot.answer_callback_query("q1", &notice),
            bot.ensure_answered(),
        );
        handler.unwrap();
        dispatcher.unwrap();

        assert!(bot.is_answered());
        assert_eq!(recorder.answer_count(), 1);
    }

    #[test]
    fn test_downcast_reaches_transport() {
        let bot: BoxedBot = Arc::new(AnsweringBot::new(RecordingBot::shared(), "q1"));
        assert!(downcast_bot::<RecordingBot>(bot).is_some());
    }
}
