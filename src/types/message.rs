//! Wire-shaped message model.
//!
//! Mirrors the protocol library's generated message structure closely enough
//! for the ingestion pipeline: every content kind is an optional field, and
//! wrapper envelopes (view-once, ephemeral, document-with-caption) nest a
//! further message. Only the fields the bridge reads are modeled.

/// Key identifying a message on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageKey {
    pub id: String,
    pub remote_jid: String,
    pub from_me: bool,
    pub participant: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtendedTextMessage {
    pub text: Option<String>,
    pub matched_text: Option<String>,
    pub canonical_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageMessage {
    pub caption: Option<String>,
    pub mimetype: Option<String>,
    pub file_length: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub media_key: Option<Vec<u8>>,
    pub direct_path: Option<String>,
    pub file_sha256: Option<Vec<u8>>,
    pub file_enc_sha256: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct VideoMessage {
    pub caption: Option<String>,
    pub mimetype: Option<String>,
    pub file_length: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub seconds: Option<u32>,
    pub gif_playback: Option<bool>,
    pub media_key: Option<Vec<u8>>,
    pub direct_path: Option<String>,
    pub file_sha256: Option<Vec<u8>>,
    pub file_enc_sha256: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct AudioMessage {
    pub mimetype: Option<String>,
    pub file_length: Option<u64>,
    pub seconds: Option<u32>,
    pub ptt: Option<bool>,
    pub media_key: Option<Vec<u8>>,
    pub direct_path: Option<String>,
    pub file_sha256: Option<Vec<u8>>,
    pub file_enc_sha256: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentMessage {
    pub caption: Option<String>,
    pub file_name: Option<String>,
    pub mimetype: Option<String>,
    pub file_length: Option<u64>,
    pub media_key: Option<Vec<u8>>,
    pub direct_path: Option<String>,
    pub file_sha256: Option<Vec<u8>>,
    pub file_enc_sha256: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct StickerMessage {
    pub mimetype: Option<String>,
    pub file_length: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub media_key: Option<Vec<u8>>,
    pub direct_path: Option<String>,
    pub file_sha256: Option<Vec<u8>>,
    pub file_enc_sha256: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct ContactMessage {
    pub display_name: Option<String>,
    pub vcard: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContactsArrayMessage {
    pub display_name: Option<String>,
    pub contacts: Vec<ContactMessage>,
}

#[derive(Debug, Clone, Default)]
pub struct LocationMessage {
    pub degrees_latitude: Option<f64>,
    pub degrees_longitude: Option<f64>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReactionMessage {
    pub key: Option<MessageKey>,
    pub text: Option<String>,
    pub sender_timestamp_ms: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct PollCreationMessage {
    pub name: Option<String>,
    pub options: Vec<String>,
    pub selectable_options_count: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ListMessage {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListResponseMessage {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ButtonsResponseMessage {
    pub selected_button_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderMessage {
    pub order_id: Option<String>,
    pub item_count: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ProductMessage {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NativeFlowResponse {
    pub name: Option<String>,
    pub params_json: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InteractiveResponseMessage {
    pub native_flow_response: Option<NativeFlowResponse>,
}

#[derive(Debug, Clone, Default)]
pub struct AppStateSyncKeyShare {}

#[derive(Debug, Clone, Default)]
pub struct ProtocolMessage {
    pub app_state_sync_key_share: Option<AppStateSyncKeyShare>,
}

#[derive(Debug, Clone, Default)]
pub struct SenderKeyDistributionMessage {
    pub group_id: Option<String>,
}

/// Wrapper envelope carrying a nested message.
#[derive(Debug, Clone, Default)]
pub struct FutureProofMessage {
    pub message: Option<Box<WaMessage>>,
}

#[derive(Debug, Clone, Default)]
pub struct WaMessage {
    pub conversation: Option<String>,
    pub extended_text_message: Option<ExtendedTextMessage>,
    pub image_message: Option<ImageMessage>,
    pub video_message: Option<VideoMessage>,
    pub audio_message: Option<AudioMessage>,
    pub document_message: Option<DocumentMessage>,
    pub sticker_message: Option<StickerMessage>,
    pub contact_message: Option<ContactMessage>,
    pub contacts_array_message: Option<ContactsArrayMessage>,
    pub location_message: Option<LocationMessage>,
    pub reaction_message: Option<ReactionMessage>,
    pub poll_creation_message: Option<PollCreationMessage>,
    pub list_message: Option<ListMessage>,
    pub list_response_message: Option<ListResponseMessage>,
    pub buttons_response_message: Option<ButtonsResponseMessage>,
    pub order_message: Option<OrderMessage>,
    pub product_message: Option<ProductMessage>,
    pub interactive_response_message: Option<InteractiveResponseMessage>,
    pub protocol_message: Option<ProtocolMessage>,
    pub sender_key_distribution_message: Option<SenderKeyDistributionMessage>,
    pub view_once_message: Option<Box<FutureProofMessage>>,
    pub ephemeral_message: Option<Box<FutureProofMessage>>,
    pub document_with_caption_message: Option<Box<FutureProofMessage>>,
}

/// Media kinds the download worker knows how to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
    Sticker,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
            MediaKind::Sticker => "sticker",
        }
    }
}

/// Everything the protocol library needs to fetch and decrypt one media
/// payload, plus the presentation fields the store records.
#[derive(Debug, Clone)]
pub struct MediaDescriptor {
    pub kind: MediaKind,
    pub mime_type: String,
    pub file_length: u64,
    /// Original file name; only documents carry one on the wire.
    pub file_name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub seconds: Option<u32>,
    pub ptt: bool,
    pub media_key: Vec<u8>,
    pub direct_path: String,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
}

impl MediaDescriptor {
    /// Media type string used by the auto-download filter. Voice notes are
    /// filtered as `ptt`, distinct from plain audio.
    pub fn filter_type(&self) -> &'static str {
        if self.ptt {
            "ptt"
        } else {
            self.kind.as_str()
        }
    }
}

impl WaMessage {
    /// Unwraps view-once / ephemeral / document-with-caption envelopes down
    /// to the innermost message.
    pub fn unwrapped(&self) -> &WaMessage {
        let inner = [
            &self.view_once_message,
            &self.ephemeral_message,
            &self.document_with_caption_message,
        ]
        .into_iter()
        .find_map(|wrapper| wrapper.as_ref().and_then(|w| w.message.as_deref()));

        match inner {
            Some(msg) => msg.unwrapped(),
            None => self,
        }
    }

    /// True for internal key-distribution payloads, which the pipeline drops
    /// without logging a word.
    pub fn is_key_distribution(&self) -> bool {
        let msg = self.unwrapped();
        if msg
            .protocol_message
            .as_ref()
            .is_some_and(|p| p.app_state_sync_key_share.is_some())
        {
            return true;
        }
        msg.sender_key_distribution_message.is_some()
            && msg.conversation.is_none()
            && msg.extended_text_message.is_none()
    }

    /// Tag describing the message content, from the fixed tag set.
    pub fn message_type(&self) -> &'static str {
        let msg = self.unwrapped();

        if msg.protocol_message.is_some() {
            return "protocol";
        }
        if let Some(ext) = &msg.extended_text_message {
            let has_url = ext.matched_text.as_deref().is_some_and(|t| !t.is_empty())
                || ext.canonical_url.as_deref().is_some_and(|u| !u.is_empty());
            return if has_url { "url" } else { "text" };
        }
        if msg.conversation.is_some() {
            return "text";
        }
        if msg.image_message.is_some() {
            return "image";
        }
        if let Some(video) = &msg.video_message {
            return if video.gif_playback.unwrap_or(false) {
                "gif"
            } else {
                "video"
            };
        }
        if let Some(audio) = &msg.audio_message {
            return if audio.ptt.unwrap_or(false) {
                "ptt"
            } else {
                "audio"
            };
        }
        if msg.sticker_message.is_some() {
            return "sticker";
        }
        if msg.document_message.is_some() {
            return "document";
        }
        if msg.contact_message.is_some() {
            return "vcard";
        }
        if msg.contacts_array_message.is_some() {
            return "contact_array";
        }
        if msg.location_message.is_some() {
            return "location";
        }
        if msg.reaction_message.is_some() {
            return "reaction";
        }
        if msg.poll_creation_message.is_some() {
            return "poll";
        }
        if msg.list_message.is_some() {
            return "list";
        }
        if msg.list_response_message.is_some() {
            return "list_response";
        }
        if msg.buttons_response_message.is_some() {
            return "buttons_response";
        }
        if msg.order_message.is_some() {
            return "order";
        }
        if msg.product_message.is_some() {
            return "product";
        }
        if msg.interactive_response_message.is_some() {
            return "native_flow_response";
        }
        "unknown"
    }

    /// Extracts the display text: extended-text body, plain conversation
    /// body, or the caption of image/video/document content.
    pub fn text_content(&self) -> Option<&str> {
        let msg = self.unwrapped();

        if let Some(text) = msg
            .extended_text_message
            .as_ref()
            .and_then(|ext| ext.text.as_deref())
        {
            if !text.is_empty() {
                return Some(text);
            }
        }
        if let Some(text) = msg.conversation.as_deref() {
            if !text.is_empty() {
                return Some(text);
            }
        }
        for caption in [
            msg.image_message.as_ref().and_then(|m| m.caption.as_deref()),
            msg.video_message.as_ref().and_then(|m| m.caption.as_deref()),
            msg.document_message
                .as_ref()
                .and_then(|m| m.caption.as_deref()),
        ] {
            if let Some(caption) = caption {
                if !caption.is_empty() {
                    return Some(caption);
                }
            }
        }
        None
    }

    /// Display text, falling back to a bracketed placeholder when the
    /// content carries no text.
    pub fn display_text(&self) -> String {
        if let Some(text) = self.text_content() {
            return text.to_string();
        }
        let placeholder = match self.message_type() {
            "image" => "[Image]",
            "video" => "[Video]",
            "gif" => "[GIF]",
            "audio" => "[Audio]",
            "ptt" => "[Voice note]",
            "sticker" => "[Sticker]",
            "document" => "[Document]",
            "vcard" => "[Contact card]",
            "contact_array" => "[Contact cards]",
            "location" => "[Location]",
            "reaction" => "[Reaction]",
            "poll" => "[Poll]",
            "list" => "[List]",
            "list_response" => "[List response]",
            "buttons_response" => "[Button response]",
            "order" => "[Order]",
            "product" => "[Product]",
            "native_flow_response" => "[Interactive response]",
            "protocol" => "[Protocol message]",
            _ => "[Unknown message type]",
        };
        placeholder.to_string()
    }

    /// Builds a download descriptor when the message carries media. Contact
    /// cards are not media.
    pub fn media_descriptor(&self) -> Option<MediaDescriptor> {
        let msg = self.unwrapped();

        if let Some(img) = &msg.image_message {
            return Some(MediaDescriptor {
                kind: MediaKind::Image,
                mime_type: img.mimetype.clone().unwrap_or_default(),
                file_length: img.file_length.unwrap_or(0),
                file_name: String::new(),
                width: img.width,
                height: img.height,
                seconds: None,
                ptt: false,
                media_key: img.media_key.clone().unwrap_or_default(),
                direct_path: img.direct_path.clone().unwrap_or_default(),
                file_sha256: img.file_sha256.clone().unwrap_or_default(),
                file_enc_sha256: img.file_enc_sha256.clone().unwrap_or_default(),
            });
        }
        if let Some(vid) = &msg.video_message {
            return Some(MediaDescriptor {
                kind: MediaKind::Video,
                mime_type: vid.mimetype.clone().unwrap_or_default(),
                file_length: vid.file_length.unwrap_or(0),
                file_name: String::new(),
                width: vid.width,
                height: vid.height,
                seconds: vid.seconds,
                ptt: false,
                media_key: vid.media_key.clone().unwrap_or_default(),
                direct_path: vid.direct_path.clone().unwrap_or_default(),
                file_sha256: vid.file_sha256.clone().unwrap_or_default(),
                file_enc_sha256: vid.file_enc_sha256.clone().unwrap_or_default(),
            });
        }
        if let Some(aud) = &msg.audio_message {
            return Some(MediaDescriptor {
                kind: MediaKind::Audio,
                mime_type: aud.mimetype.clone().unwrap_or_default(),
                file_length: aud.file_length.unwrap_or(0),
                file_name: String::new(),
                width: None,
                height: None,
                seconds: aud.seconds,
                ptt: aud.ptt.unwrap_or(false),
                media_key: aud.media_key.clone().unwrap_or_default(),
                direct_path: aud.direct_path.clone().unwrap_or_default(),
                file_sha256: aud.file_sha256.clone().unwrap_or_default(),
                file_enc_sha256: aud.file_enc_sha256.clone().unwrap_or_default(),
            });
        }
        if let Some(doc) = &msg.document_message {
            return Some(MediaDescriptor {
                kind: MediaKind::Document,
                mime_type: doc.mimetype.clone().unwrap_or_default(),
                file_length: doc.file_length.unwrap_or(0),
                file_name: doc.file_name.clone().unwrap_or_default(),
                width: None,
                height: None,
                seconds: None,
                ptt: false,
                media_key: doc.media_key.clone().unwrap_or_default(),
                direct_path: doc.direct_path.clone().unwrap_or_default(),
                file_sha256: doc.file_sha256.clone().unwrap_or_default(),
                file_enc_sha256: doc.file_enc_sha256.clone().unwrap_or_default(),
            });
        }
        if let Some(sticker) = &msg.sticker_message {
            return Some(MediaDescriptor {
                kind: MediaKind::Sticker,
                mime_type: sticker.mimetype.clone().unwrap_or_default(),
                file_length: sticker.file_length.unwrap_or(0),
                file_name: String::new(),
                width: sticker.width,
                height: sticker.height,
                seconds: None,
                ptt: false,
                media_key: sticker.media_key.clone().unwrap_or_default(),
                direct_path: sticker.direct_path.clone().unwrap_or_default(),
                file_sha256: sticker.file_sha256.clone().unwrap_or_default(),
                file_enc_sha256: sticker.file_enc_sha256.clone().unwrap_or_default(),
            });
        }
        None
    }

    /// Convenience constructor for a plain text message.
    pub fn text(text: impl Into<String>) -> Self {
        WaMessage {
            conversation: Some(text.into()),
            ..Default::default()
        }
    }
}
