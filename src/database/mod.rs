use mongodb::{Client, Collection, Database};
use std::error::Error;

#[derive(Clone)]
pub struct MongoDB {
    client: Client,
    db: Database,
}

impl MongoDB {
    pub async fn new(uri: &str) -> Result<Self, Box<dyn Error>> {
        let mut client_options = mongodb::options::ClientOptions::parse(uri).await?;

        // Connection pool otimizado
        client_options.max_pool_size = Some(20);
        client_options.min_pool_size = Some(5);
        client_options.max_idle_time = Some(std::time::Duration::from_secs(300));

        client_options.connect_timeout = Some(std::time::Duration::from_secs(5));
        client_options.server_selection_timeout = Some(std::time::Duration::from_secs(5));

        let client = Client::with_options(client_options)?;

        // Extract database name from URI or use default
        let db_name = uri
            .split('/')
            .last()
            .and_then(|s| s.split('?').next())
            .unwrap_or("MortgageSync");

        let db = client.database(db_name);

        // Test connection
        db.list_collection_names().await?;

        let mongodb = Self { client, db };

        mongodb.ensure_indexes().await?;

        Ok(mongodb)
    }

    /// Creates the indexes that back the data-model invariants: Person
    /// uniqueness by email, one credential per account id, one external
    /// record link per participant, one participant per (application, order).
    async fn ensure_indexes(&self) -> Result<(), Box<dyn Error>> {
        use mongodb::bson::doc;
        use mongodb::options::IndexOptions;
        use mongodb::IndexModel;

        log::info!("🔧 Creating database indexes...");

        let unique = IndexOptions::builder().unique(true).build();

        // people(email) UNIQUE - identity resolution key
        let people = self.db.collection::<mongodb::bson::Document>("people");
        let people_email = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(unique.clone())
            .build();
        match people.create_index(people_email).await {
            Ok(_) => log::info!("   ✅ Index created: people(email) unique"),
            Err(e) => log::debug!("   ℹ️  Index already exists: {}", e),
        }

        // oauth_tokens(account_id) UNIQUE - one credential pair per account
        let tokens = self.db.collection::<mongodb::bson::Document>("oauth_tokens");
        let tokens_account = IndexModel::builder()
            .keys(doc! { "account_id": 1 })
            .options(unique.clone())
            .build();
        match tokens.create_index(tokens_account).await {
            Ok(_) => log::info!("   ✅ Index created: oauth_tokens(account_id) unique"),
            Err(e) => log::debug!("   ℹ️  Index already exists: {}", e),
        }

        // external_record_links(participant_id) UNIQUE - CRM creation guard
        let links = self
            .db
            .collection::<mongodb::bson::Document>("external_record_links");
        let links_participant = IndexModel::builder()
            .keys(doc! { "participant_id": 1 })
            .options(unique.clone())
            .build();
        match links.create_index(links_participant).await {
            Ok(_) => log::info!("   ✅ Index created: external_record_links(participant_id) unique"),
            Err(e) => log::debug!("   ℹ️  Index already exists: {}", e),
        }

        // application_participants(application_id, order) UNIQUE -
        // exactly one primary (order=1), contiguous co-applicant orders
        let participants = self
            .db
            .collection::<mongodb::bson::Document>("application_participants");
        let participants_order = IndexModel::builder()
            .keys(doc! { "application_id": 1, "order": 1 })
            .options(unique)
            .build();
        match participants.create_index(participants_order).await {
            Ok(_) => log::info!("   ✅ Index created: application_participants(application_id, order) unique"),
            Err(e) => log::debug!("   ℹ️  Index already exists: {}", e),
        }

        // Lookup indexes for the step save / load paths
        for (collection, key) in [
            ("application_participants", "participant_id"),
            ("employment_details", "participant_id"),
            ("financial_commitments", "participant_id"),
            ("rental_properties", "participant_id"),
            ("person_children", "person_id"),
            ("verification_codes", "email"),
        ] {
            let coll = self.db.collection::<mongodb::bson::Document>(collection);
            let index = IndexModel::builder().keys(doc! { key: 1 }).build();
            match coll.create_index(index).await {
                Ok(_) => log::info!("   ✅ Index created: {}({})", collection, key),
                Err(e) => log::debug!("   ℹ️  Index already exists: {}", e),
            }
        }

        log::info!("✅ Database indexes ready");

        Ok(())
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}
