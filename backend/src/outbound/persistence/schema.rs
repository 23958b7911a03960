//! Diesel table definitions matching `backend/migrations`.

diesel::table! {
    /// Platform users. Only the columns the gateway reads are listed.
    users (id) {
        id -> Uuid,
        display_name -> Nullable<Varchar>,
        /// Push token of the user's current device.
        device_token -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Connection requests between users; `status` is `pending` or
    /// `accepted`.
    user_connections (user_id, connected_user_id) {
        user_id -> Uuid,
        connected_user_id -> Uuid,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Direct messages. Rows are never deleted.
    messages (id) {
        id -> Uuid,
        sender_id -> Uuid,
        receiver_id -> Uuid,
        content -> Text,
        created_at -> Timestamptz,
        edited -> Bool,
        edited_at -> Nullable<Timestamptz>,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// At most one receipt per message and reader.
    read_receipts (message_id, reader_id) {
        message_id -> Uuid,
        reader_id -> Uuid,
        read_at -> Timestamptz,
    }
}

diesel::joinable!(read_receipts -> messages (message_id));
diesel::allow_tables_to_appear_in_same_query!(messages, read_receipts, user_connections, users);
