diesel::table! {
    company_collection_associations (id) {
        id -> Int4,
        company_id -> Int4,
        collection_id -> Uuid,
        created_at -> Timestamp,
    }
}

diesel::table! {
    company_collections (id) {
        id -> Uuid,
        collection_name -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    companies (id) {
        id -> Int4,
        company_name -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    harmonic_settings (setting_name) {
        setting_name -> Text,
    }
}

diesel::joinable!(company_collection_associations -> companies (company_id));
diesel::joinable!(company_collection_associations -> company_collections (collection_id));

diesel::allow_tables_to_appear_in_same_query!(
    company_collection_associations,
    company_collections,
    companies,
    harmonic_settings,
);
