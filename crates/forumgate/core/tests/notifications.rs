// Forumgate
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use forumgate_core::access::UserId;
use forumgate_core::notify::{
    FORUM_REPLY_SOURCE, NotificationAggregator, NotificationSourceDescriptor, PRIVATE_MESSAGE_SOURCE, Payload, SourceRegistryBuilder,
};
use std::sync::Arc;

fn url(value: &str) -> Payload {
    [("url".to_string(), value.to_string())].into_iter().collect()
}

fn aggregator() -> NotificationAggregator {
    NotificationAggregator::new(Arc::new(SourceRegistryBuilder::with_defaults().build()))
}

#[test]
fn test_private_message_digest_renders_bullets_once() {
    let aggregator = aggregator();
    let recipient = UserId(3);

    aggregator.enqueue(PRIVATE_MESSAGE_SOURCE, recipient, url("/m/1")).unwrap();
    aggregator.enqueue(PRIVATE_MESSAGE_SOURCE, recipient, url("/m/2")).unwrap();

    let digest = aggregator.build_digest(recipient, PRIVATE_MESSAGE_SOURCE).unwrap().unwrap();
    assert_eq!(digest.message, "You have new messages: - /m/1\n - /m/2");
    assert_eq!(digest.entries, vec![url("/m/1"), url("/m/2")]);

    assert!(aggregator.build_digest(recipient, PRIVATE_MESSAGE_SOURCE).unwrap().is_none());
}

#[test]
fn test_digest_consumes_exactly_the_enqueued_events() {
    let aggregator = aggregator();

    for i in 0..5 {
        aggregator.enqueue(FORUM_REPLY_SOURCE, UserId(1), url(&format!("/t/{i}"))).unwrap();
    }
    aggregator.enqueue(FORUM_REPLY_SOURCE, UserId(2), url("/t/other")).unwrap();

    let digest = aggregator.build_digest(UserId(1), FORUM_REPLY_SOURCE).unwrap().unwrap();
    assert_eq!(digest.entries.len(), 5);
    assert_eq!(aggregator.pending_count(UserId(1), FORUM_REPLY_SOURCE), 0);
    assert_eq!(aggregator.pending_count(UserId(2), FORUM_REPLY_SOURCE), 1);
    assert!(aggregator.build_digest(UserId(1), FORUM_REPLY_SOURCE).unwrap().is_none());
}

#[test]
fn test_duplicate_events_stay_separate_entries() {
    let aggregator = aggregator();
    aggregator.enqueue(PRIVATE_MESSAGE_SOURCE, UserId(4), url("/m/9")).unwrap();
    aggregator.enqueue(PRIVATE_MESSAGE_SOURCE, UserId(4), url("/m/9")).unwrap();

    let digest = aggregator.build_digest(UserId(4), PRIVATE_MESSAGE_SOURCE).unwrap().unwrap();
    assert_eq!(digest.message, "You have new messages: - /m/9\n - /m/9");
}

#[test]
fn test_custom_source_keeps_undeclared_placeholders() {
    let mut builder = SourceRegistryBuilder::new();
    builder
        .register(
            NotificationSourceDescriptor::new("friend_request", "Friend requests", "{user} wants to connect:{request-list}")
                .with_token("request-list", "Pending requests")
                .with_token_field("request-list", "name"),
        )
        .unwrap();
    let aggregator = NotificationAggregator::new(Arc::new(builder.build()));

    let payload: Payload = [("name".to_string(), "ada".to_string())].into_iter().collect();
    aggregator.enqueue("friend_request", UserId(5), payload).unwrap();

    let digest = aggregator.build_digest(UserId(5), "friend_request").unwrap().unwrap();
    assert_eq!(digest.message, "{user} wants to connect:\n - ada");
}

#[test]
fn test_concurrent_enqueue_and_drain_lose_nothing() {
    let aggregator = Arc::new(aggregator());
    let recipient = UserId(6);

    let producers: Vec<_> = (0..4)
        .map(|worker| {
            let aggregator = aggregator.clone();
            std::thread::spawn(move || {
                for i in 0..250 {
                    aggregator.enqueue(PRIVATE_MESSAGE_SOURCE, recipient, url(&format!("/m/{worker}/{i}"))).unwrap();
                }
            })
        })
        .collect();

    let mut drained = 0;
    while producers.iter().any(|producer| !producer.is_finished()) {
        drained += aggregator.drain(recipient, PRIVATE_MESSAGE_SOURCE).len();
    }
    for producer in producers {
        producer.join().unwrap();
    }
    drained += aggregator.drain(recipient, PRIVATE_MESSAGE_SOURCE).len();

    assert_eq!(drained, 1000);
}

#[test]
fn test_unknown_source_is_rejected() {
    let aggregator = aggregator();
    let err = aggregator.enqueue("newsletter", UserId(1), Payload::new()).unwrap_err();
    assert_eq!(err.error_class(), "NotFoundError");
    assert!(!err.is_retryable());
}
