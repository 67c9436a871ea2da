//! Feed records and the classifier that decides how each one resolves.

use jacquard::api::app_bsky::actor::profile::Profile;
use jacquard::api::app_bsky::embed::external::External;
use jacquard::api::app_bsky::embed::images::Image;
use jacquard::api::app_bsky::embed::record_with_media::RecordWithMediaMedia;
use jacquard::api::app_bsky::feed::like::Like;
use jacquard::api::app_bsky::feed::post::{Post, PostEmbed};
use jacquard::api::app_bsky::feed::repost::Repost;
use jacquard::api::app_bsky::graph::block::Block;
use jacquard::api::app_bsky::graph::follow::Follow;
use jacquard::api::com_atproto::repo::strong_ref::StrongRef;
use jacquard::types::string::{AtUri, Cid};
use jacquard::{Data, IntoStatic};
use serde::Deserialize;

pub const POST: &str = "app.bsky.feed.post";
pub const LIKE: &str = "app.bsky.feed.like";
pub const REPOST: &str = "app.bsky.feed.repost";
pub const FOLLOW: &str = "app.bsky.graph.follow";
pub const BLOCK: &str = "app.bsky.graph.block";
pub const PROFILE: &str = "app.bsky.actor.profile";

/// One entry of a `listRecords` page.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub uri: AtUri<'static>,
    pub cid: Option<Cid<'static>>,
    pub value: Option<Data<'static>>,
    /// Set when the service could not produce the record
    pub error: Option<String>,
}

impl RawRecord {
    pub fn uri(&self) -> &str {
        self.uri.as_ref()
    }

    /// The declared `$type` of the payload, if any.
    pub fn type_tag(&self) -> Option<&str> {
        self.value
            .as_ref()?
            .type_discriminator()
            .filter(|tag| !tag.is_empty())
    }
}

/// What the record's owner did to the referenced entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Liked,
    Shared,
    Followed,
    Blocked,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Liked => "liked",
            Verb::Shared => "shared",
            Verb::Followed => "followed",
            Verb::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A feed record sorted into the closed set of shapes the viewer knows.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordKind {
    Post(Post<'static>),
    Profile(Profile<'static>),
    Like(Like<'static>),
    Repost(Repost<'static>),
    Follow(Follow<'static>),
    Block(Block<'static>),
    /// `$type` we have no renderer for
    Unknown(String),
    /// Known `$type`, but the payload does not have the expected shape
    Malformed(String),
    /// The service reported an error in place of the record
    ServiceError(String),
    /// No payload type and no error: nothing to show
    Untyped,
}

/// The secondary fetch a record needs before it can be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject<'a> {
    Post { uri: &'a str, cid: &'a str },
    Profile { actor: &'a str },
}

impl RecordKind {
    /// Verb and timestamp of the wrapping record, for records that point elsewhere.
    pub fn activity(&self) -> Option<(Verb, String)> {
        match self {
            RecordKind::Like(like) => Some((Verb::Liked, like.created_at.to_string())),
            RecordKind::Repost(repost) => Some((Verb::Shared, repost.created_at.to_string())),
            RecordKind::Follow(follow) => Some((Verb::Followed, follow.created_at.to_string())),
            RecordKind::Block(block) => Some((Verb::Blocked, block.created_at.to_string())),
            _ => None,
        }
    }

    pub fn subject(&self) -> Option<Subject<'_>> {
        match self {
            RecordKind::Like(Like { subject, .. }) | RecordKind::Repost(Repost { subject, .. }) => {
                Some(strong_subject(subject))
            }
            RecordKind::Follow(Follow { subject, .. }) | RecordKind::Block(Block { subject, .. }) => {
                Some(Subject::Profile {
                    actor: subject.as_ref(),
                })
            }
            _ => None,
        }
    }

    /// Renderable as-is, without a secondary fetch.
    pub fn is_direct(&self) -> bool {
        matches!(self, RecordKind::Post(_) | RecordKind::Profile(_))
    }
}

fn strong_subject<'a>(subject: &'a StrongRef<'static>) -> Subject<'a> {
    Subject::Post {
        uri: subject.uri.as_ref(),
        cid: subject.cid.as_ref(),
    }
}

/// Sort a raw record into its [`RecordKind`].
///
/// A service-reported error wins over any payload. A payload without a type
/// tag is [`RecordKind::Untyped`]. A recognised tag whose payload does not
/// decode is [`RecordKind::Malformed`].
pub fn classify(record: &RawRecord) -> RecordKind {
    if let Some(error) = record.error.as_deref().filter(|e| !e.is_empty()) {
        return RecordKind::ServiceError(error.to_string());
    }
    let (Some(value), Some(tag)) = (&record.value, record.type_tag()) else {
        return RecordKind::Untyped;
    };
    let uri = record.uri();

    let kind = match tag {
        POST => decode::<Post>(uri, value, "post").map(|p| RecordKind::Post(p.into_static())),
        PROFILE => decode::<Profile>(uri, value, "profile")
            .map(|p| RecordKind::Profile(p.into_static())),
        LIKE => decode::<Like>(uri, value, "like").map(|l| RecordKind::Like(l.into_static())),
        REPOST => {
            decode::<Repost>(uri, value, "repost").map(|r| RecordKind::Repost(r.into_static()))
        }
        FOLLOW => {
            decode::<Follow>(uri, value, "follow").map(|f| RecordKind::Follow(f.into_static()))
        }
        BLOCK => decode::<Block>(uri, value, "block").map(|b| RecordKind::Block(b.into_static())),
        other => Ok(RecordKind::Unknown(other.to_string())),
    };
    kind.unwrap_or_else(|malformed| malformed)
}

/// Check that a fetched value is a post and decode it.
pub fn as_post(value: &Data<'_>) -> Option<Post<'static>> {
    (value.type_discriminator() == Some(POST))
        .then(|| jacquard::from_data::<Post>(value).ok())
        .flatten()
        .map(IntoStatic::into_static)
}

/// Check that a fetched value is a profile and decode it.
pub fn as_profile(value: &Data<'_>) -> Option<Profile<'static>> {
    (value.type_discriminator() == Some(PROFILE))
        .then(|| jacquard::from_data::<Profile>(value).ok())
        .flatten()
        .map(IntoStatic::into_static)
}

fn decode<'v, T: Deserialize<'v>>(
    uri: &str,
    value: &'v Data<'v>,
    kind: &str,
) -> Result<T, RecordKind> {
    jacquard::from_data(value)
        .map_err(|e| RecordKind::Malformed(format!("Invalid {kind} record {uri}: {e}")))
}

/// The quoted record, for quote posts.
pub fn quoted<'p>(post: &'p Post<'static>) -> Option<&'p StrongRef<'static>> {
    match post.embed.as_ref()? {
        PostEmbed::Record(embed) => Some(&embed.record),
        PostEmbed::RecordWithMedia(embed) => Some(&embed.record.record),
        _ => None,
    }
}

pub fn images<'p>(post: &'p Post<'static>) -> &'p [Image<'static>] {
    match post.embed.as_ref() {
        Some(PostEmbed::Images(embed)) => &embed.images,
        Some(PostEmbed::RecordWithMedia(embed)) => match &embed.media {
            RecordWithMediaMedia::Images(media) => &media.images,
            _ => &[],
        },
        _ => &[],
    }
}

pub fn external<'p>(post: &'p Post<'static>) -> Option<&'p External<'static>> {
    match post.embed.as_ref()? {
        PostEmbed::External(embed) => Some(&embed.external),
        PostEmbed::RecordWithMedia(embed) => match &embed.media {
            RecordWithMediaMedia::External(media) => Some(&media.external),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CID_IMAGE, CID_POST, data, raw};
    use serde_json::json;

    fn like_raw(value: serde_json::Value) -> RawRecord {
        raw("at://did:plc:abc/app.bsky.feed.like/1", value)
    }

    #[test]
    fn test_classify_post_with_quote_and_images() {
        let record = like_raw(json!({
            "$type": POST,
            "text": "look",
            "createdAt": "2024-05-01T12:00:00.000Z",
            "embed": {
                "$type": "app.bsky.embed.recordWithMedia",
                "record": {
                    "$type": "app.bsky.embed.record",
                    "record": {"uri": "at://did:plc:q/app.bsky.feed.post/9", "cid": CID_POST}
                },
                "media": {
                    "$type": "app.bsky.embed.images",
                    "images": [{
                        "image": {"$type": "blob", "ref": {"$link": CID_IMAGE}, "mimeType": "image/jpeg", "size": 10},
                        "alt": "cat"
                    }]
                }
            }
        }));
        let RecordKind::Post(post) = classify(&record) else {
            panic!("expected a post");
        };
        let quote: &str = quoted(&post).unwrap().uri.as_ref();
        assert_eq!(quote, "at://did:plc:q/app.bsky.feed.post/9");
        assert_eq!(images(&post).len(), 1);
        let cid: &str = images(&post)[0].image.blob().cid().as_ref();
        assert_eq!(cid, CID_IMAGE);
        assert!(external(&post).is_none());
    }

    #[test]
    fn test_classify_external_link() {
        let record = like_raw(json!({
            "$type": POST,
            "text": "read this",
            "createdAt": "2024-05-01T12:00:00.000Z",
            "embed": {
                "$type": "app.bsky.embed.external",
                "external": {
                    "uri": "https://example.com/article",
                    "title": "An article",
                    "description": "About things"
                }
            }
        }));
        let RecordKind::Post(post) = classify(&record) else {
            panic!("expected a post");
        };
        let link = external(&post).unwrap();
        assert_eq!(&*link.title, "An article");
        assert!(link.thumb.is_none());
        assert!(quoted(&post).is_none());
        assert!(images(&post).is_empty());
    }

    #[test]
    fn test_classify_like_keeps_wrapping_timestamp() {
        let record = like_raw(json!({
            "$type": LIKE,
            "subject": {"uri": "at://did:plc:abc/app.bsky.feed.post/123", "cid": CID_POST},
            "createdAt": "2024-06-01T00:00:00.000Z"
        }));
        let kind = classify(&record);
        assert_eq!(
            kind.activity(),
            Some((Verb::Liked, "2024-06-01T00:00:00.000Z".to_string()))
        );
        assert_eq!(
            kind.subject(),
            Some(Subject::Post {
                uri: "at://did:plc:abc/app.bsky.feed.post/123",
                cid: CID_POST,
            })
        );
        assert!(!kind.is_direct());
    }

    #[test]
    fn test_classify_graph_records() {
        let follow = like_raw(json!({
            "$type": FOLLOW,
            "subject": "did:plc:bob",
            "createdAt": "2024-06-01T00:00:00.000Z"
        }));
        assert_eq!(
            classify(&follow).subject(),
            Some(Subject::Profile {
                actor: "did:plc:bob"
            })
        );
        let block = like_raw(json!({
            "$type": BLOCK,
            "subject": "did:plc:eve",
            "createdAt": "2024-06-02T00:00:00.000Z"
        }));
        assert_eq!(
            classify(&block).activity(),
            Some((Verb::Blocked, "2024-06-02T00:00:00.000Z".to_string()))
        );
    }

    #[test]
    fn test_untyped_and_service_errors_are_distinct() {
        let untyped = like_raw(json!({"text": "no type"}));
        assert_eq!(classify(&untyped), RecordKind::Untyped);

        let missing = RawRecord {
            value: None,
            ..like_raw(json!({}))
        };
        assert_eq!(classify(&missing), RecordKind::Untyped);

        let errored = RawRecord {
            error: Some("RecordNotFound".into()),
            ..like_raw(json!({"text": "no type"}))
        };
        assert_eq!(
            classify(&errored),
            RecordKind::ServiceError("RecordNotFound".into())
        );
    }

    #[test]
    fn test_malformed_and_unknown() {
        let broken_like = like_raw(json!({"$type": LIKE, "createdAt": "2024-06-01T00:00:00.000Z"}));
        match classify(&broken_like) {
            RecordKind::Malformed(msg) => assert!(
                msg.starts_with("Invalid like record at://did:plc:abc/app.bsky.feed.like/1"),
                "{msg}"
            ),
            other => panic!("unexpected {other:?}"),
        }

        let threadgate = like_raw(json!({"$type": "app.bsky.feed.threadgate", "post": "x"}));
        assert_eq!(
            classify(&threadgate),
            RecordKind::Unknown("app.bsky.feed.threadgate".into())
        );
    }

    #[test]
    fn test_fetched_values_are_checked_by_type() {
        let video = data(json!({
            "$type": POST,
            "text": "video",
            "createdAt": "2024-06-01T00:00:00.000Z",
            "embed": {"$type": "app.bsky.embed.video", "video": {"$type": "blob", "ref": {"$link": CID_IMAGE}, "mimeType": "video/mp4", "size": 1}}
        }));
        let post = as_post(&video).unwrap();
        assert!(images(&post).is_empty());
        assert!(external(&post).is_none());

        assert!(as_post(&data(json!({"$type": PROFILE}))).is_none());
        let profile = as_profile(&data(json!({"$type": PROFILE, "displayName": "Al"}))).unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Al"));
    }
}
