diesel::table! {
    category (id) {
        id -> Int4,
        name -> Text,
        sort_order -> Int4,
    }
}

diesel::table! {
    board (id) {
        id -> Int4,
        category_id -> Int4,
        name -> Text,
        description -> Text,
        sort_order -> Int4,
        thread_count -> Int4,
        post_count -> Int4,
        last_post_id -> Nullable<Int4>,
    }
}

diesel::table! {
    thread (id) {
        id -> Int4,
        board_id -> Int4,
        author_id -> Int4,
        title -> Text,
        reply_count -> Int4,
        views -> Int4,
        is_sticky -> Bool,
        is_locked -> Bool,
        is_deleted -> Bool,
        created_at -> Timestamptz,
        last_post_at -> Timestamptz,
    }
}

diesel::table! {
    post (id) {
        id -> Int4,
        thread_id -> Int4,
        author_id -> Int4,
        body -> Text,
        created_at -> Timestamptz,
        updated_at -> Nullable<Timestamptz>,
        edited_by -> Nullable<Int4>,
        is_deleted -> Bool,
    }
}

diesel::joinable!(board -> category (category_id));
diesel::joinable!(thread -> board (board_id));
diesel::joinable!(post -> thread (thread_id));

diesel::allow_tables_to_appear_in_same_query!(category, board, thread, post);
