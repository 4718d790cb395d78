pub mod fetch_user_data;
