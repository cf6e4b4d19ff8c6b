// Table definitions matching the embedded SQL migrations.

diesel::table! {
    chats (jid) {
        jid -> Text,
        push_name -> Text,
        contact_name -> Text,
        last_message_time -> BigInt,
        unread_count -> Integer,
        is_group -> Bool,
    }
}

diesel::table! {
    messages (id) {
        id -> Text,
        chat_jid -> Text,
        sender_jid -> Text,
        text -> Text,
        timestamp -> BigInt,
        is_from_me -> Bool,
        message_type -> Text,
    }
}

diesel::table! {
    push_names (jid) {
        jid -> Text,
        push_name -> Text,
        updated_at -> BigInt,
    }
}

diesel::table! {
    group_participants (group_jid, participant_jid) {
        group_jid -> Text,
        participant_jid -> Text,
        is_admin -> Bool,
        joined_at -> BigInt,
    }
}

diesel::table! {
    media_metadata (message_id) {
        message_id -> Text,
        file_name -> Text,
        file_size -> BigInt,
        mime_type -> Text,
        width -> Nullable<Integer>,
        height -> Nullable<Integer>,
        duration -> Nullable<Integer>,
        media_key -> Binary,
        direct_path -> Text,
        file_sha256 -> Binary,
        file_enc_sha256 -> Binary,
        file_path -> Text,
        download_status -> Text,
        download_timestamp -> Nullable<BigInt>,
        download_error -> Nullable<Text>,
    }
}

diesel::table! {
    webhook_registrations (id) {
        id -> Text,
        url -> Text,
        secret -> Text,
        event_types -> Text,
        active -> Bool,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}

diesel::table! {
    webhook_deliveries (id) {
        id -> Integer,
        webhook_id -> Text,
        payload_id -> Text,
        event_type -> Text,
        attempt_number -> Integer,
        status_code -> Nullable<Integer>,
        success -> Bool,
        error -> Nullable<Text>,
        attempted_at -> BigInt,
    }
}

diesel::table! {
    schema_migrations (version) {
        version -> Integer,
        description -> Text,
        applied_at -> BigInt,
        checksum -> Text,
    }
}

diesel::joinable!(messages -> chats (chat_jid));
diesel::joinable!(group_participants -> chats (group_jid));
diesel::joinable!(media_metadata -> messages (message_id));

diesel::allow_tables_to_appear_in_same_query!(chats, messages, push_names, media_metadata);
