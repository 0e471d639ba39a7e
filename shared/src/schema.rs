diesel::table! {
    access_codes (id) {
        id -> Uuid,
        code -> Varchar,
        label -> Varchar,
        is_active -> Bool,
        expires_at -> Nullable<Timestamptz>,
        max_uses -> Nullable<Int4>,
        use_count -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    access_logs (id) {
        id -> Uuid,
        access_code_id -> Nullable<Uuid>,
        code_attempted -> Varchar,
        success -> Bool,
        ip_address -> Nullable<Varchar>,
        user_agent -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    amenities (id) {
        id -> Uuid,
        name -> Varchar,
        icon -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    inquiries (id) {
        id -> Uuid,
        property_id -> Nullable<Uuid>,
        name -> Varchar,
        email -> Varchar,
        phone -> Nullable<Varchar>,
        subject -> Varchar,
        message -> Text,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    inquiry_messages (id) {
        id -> Uuid,
        inquiry_id -> Uuid,
        sender -> Varchar,
        body -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    properties (id) {
        id -> Uuid,
        slug -> Varchar,
        name -> Varchar,
        description -> Text,
        address -> Varchar,
        address_en -> Nullable<Varchar>,
        max_guests -> Int4,
        bedrooms -> Int4,
        bathrooms -> Int4,
        price_per_night -> Numeric,
        is_visible -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    property_amenities (property_id, amenity_id) {
        property_id -> Uuid,
        amenity_id -> Uuid,
    }
}

diesel::table! {
    property_images (id) {
        id -> Uuid,
        property_id -> Uuid,
        url -> Varchar,
        storage_path -> Nullable<Varchar>,
        display_order -> Int4,
        is_thumbnail -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    reservations (id) {
        id -> Uuid,
        property_id -> Uuid,
        confirmation_code -> Varchar,
        guest_name -> Varchar,
        guest_email -> Varchar,
        guest_phone -> Nullable<Varchar>,
        guest_count -> Int4,
        check_in_date -> Date,
        check_out_date -> Date,
        total_price -> Numeric,
        status -> Varchar,
        special_requests -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(access_logs -> access_codes (access_code_id));
diesel::joinable!(inquiries -> properties (property_id));
diesel::joinable!(inquiry_messages -> inquiries (inquiry_id));
diesel::joinable!(property_amenities -> amenities (amenity_id));
diesel::joinable!(property_amenities -> properties (property_id));
diesel::joinable!(property_images -> properties (property_id));
diesel::joinable!(reservations -> properties (property_id));

diesel::allow_tables_to_appear_in_same_query!(
    access_codes,
    access_logs,
    amenities,
    inquiries,
    inquiry_messages,
    properties,
    property_amenities,
    property_images,
    reservations,
);
