use std::time::SystemTime;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tracing::warn;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoRoomDocument, MongoRoomMessageDocument, MongoScenarioDocument, MongoUserDocument,
        doc_id, versioned_doc_id,
    },
};
use crate::{
    dao::{
        models::{RoomEntity, RoomMessageEntity, ScenarioEntity},
        storage::StorageResult,
        store::{
            MemberDirectory, RoomMessageStore, RoomStore, ScenarioStore, UNKNOWN_MEMBER_NAME,
        },
    },
    state::{room::RoomStatus, scenario::ModerationState},
};

const ROOM_COLLECTION_NAME: &str = "situation_rooms";
const SCENARIO_COLLECTION_NAME: &str = "situation_scenarios";
const MESSAGE_COLLECTION_NAME: &str = "situation_room_messages";
const USER_COLLECTION_NAME: &str = "users";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB implementation of the room, scenario, chat and member collaborators.
#[derive(Clone)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (_client, database) =
            establish_connection(&config.options, &config.database_name, &config.retry).await?;

        let store = Self { database };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let rooms = self.database.collection::<MongoRoomDocument>(ROOM_COLLECTION_NAME);
        let indexes = [
            ("room_members_idx", doc! {"members": 1, "created_at": -1}, "members"),
            ("room_status_idx", doc! {"status": 1, "created_at": 1}, "status"),
        ];
        for (name, keys, label) in indexes {
            let index = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(Some(name.to_owned())).build())
                .build();
            rooms
                .create_index(index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection: ROOM_COLLECTION_NAME,
                    index: label,
                    source,
                })?;
        }

        let scenarios = self.scenarios();
        let index = IndexModel::builder()
            .keys(doc! {"state": 1, "submitter_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("scenario_state_idx".to_owned()))
                    .build(),
            )
            .build();
        scenarios
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SCENARIO_COLLECTION_NAME,
                index: "state,submitter_id",
                source,
            })?;

        let index = IndexModel::builder()
            .keys(doc! {"room_code": 1, "created_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("message_room_idx".to_owned()))
                    .build(),
            )
            .build();
        self.messages()
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: MESSAGE_COLLECTION_NAME,
                index: "room_code,created_at",
                source,
            })?;

        Ok(())
    }

    fn rooms(&self) -> Collection<MongoRoomDocument> {
        self.database
            .collection::<MongoRoomDocument>(ROOM_COLLECTION_NAME)
    }

    fn scenarios(&self) -> Collection<MongoScenarioDocument> {
        self.database
            .collection::<MongoScenarioDocument>(SCENARIO_COLLECTION_NAME)
    }

    fn messages(&self) -> Collection<MongoRoomMessageDocument> {
        self.database
            .collection::<MongoRoomMessageDocument>(MESSAGE_COLLECTION_NAME)
    }

    fn users(&self) -> Collection<MongoUserDocument> {
        self.database
            .collection::<MongoUserDocument>(USER_COLLECTION_NAME)
    }

    async fn load_room(&self, code: String) -> MongoResult<Option<RoomEntity>> {
        let document = self
            .rooms()
            .find_one(doc_id(&code))
            .await
            .map_err(|source| MongoDaoError::LoadRoom { code, source })?;
        Ok(document.map(Into::into))
    }

    /// Insert when the room was never stored, otherwise replace only the expected version.
    async fn save_room(&self, room: RoomEntity) -> MongoResult<u64> {
        let code = room.code.clone();
        let expected_version = room.version;
        let document = MongoRoomDocument::next_version_of(room);
        let collection = self.rooms();

        if expected_version == 0 {
            return match collection.insert_one(&document).await {
                Ok(_) => Ok(1),
                Err(source) if is_duplicate_key(&source) => Err(MongoDaoError::VersionConflict {
                    key: code,
                    expected_version,
                }),
                Err(source) => Err(MongoDaoError::SaveRoom { code, source }),
            };
        }

        let result = collection
            .replace_one(versioned_doc_id(&code, expected_version), &document)
            .await
            .map_err(|source| MongoDaoError::SaveRoom {
                code: code.clone(),
                source,
            })?;

        if result.matched_count == 0 {
            return Err(MongoDaoError::VersionConflict {
                key: code,
                expected_version,
            });
        }

        Ok(expected_version + 1)
    }

    async fn room_exists(&self, code: String) -> MongoResult<bool> {
        let count = self
            .rooms()
            .count_documents(doc_id(&code))
            .await
            .map_err(|source| MongoDaoError::LoadRoom { code, source })?;
        Ok(count > 0)
    }

    async fn find_rooms(
        &self,
        filter: Document,
        sort: Document,
    ) -> MongoResult<Vec<RoomEntity>> {
        let documents: Vec<MongoRoomDocument> = self
            .rooms()
            .find(filter)
            .sort(sort)
            .await
            .map_err(|source| MongoDaoError::QueryRooms { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::QueryRooms { source })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    /// Same version contract as [`Self::save_room`].
    async fn save_scenario(&self, scenario: ScenarioEntity) -> MongoResult<u64> {
        let id = scenario.id.clone();
        let expected_version = scenario.version;
        let document = MongoScenarioDocument::next_version_of(scenario);
        let collection = self.scenarios();

        if expected_version == 0 {
            return match collection.insert_one(&document).await {
                Ok(_) => Ok(1),
                Err(source) if is_duplicate_key(&source) => Err(MongoDaoError::VersionConflict {
                    key: id,
                    expected_version,
                }),
                Err(source) => Err(MongoDaoError::SaveScenario { id, source }),
            };
        }

        let result = collection
            .replace_one(versioned_doc_id(&id, expected_version), &document)
            .await
            .map_err(|source| MongoDaoError::SaveScenario {
                id: id.clone(),
                source,
            })?;

        if result.matched_count == 0 {
            return Err(MongoDaoError::VersionConflict {
                key: id,
                expected_version,
            });
        }

        Ok(expected_version + 1)
    }

    async fn find_scenario(&self, id: String) -> MongoResult<Option<ScenarioEntity>> {
        let document = self
            .scenarios()
            .find_one(doc_id(&id))
            .await
            .map_err(|source| MongoDaoError::LoadScenario { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn find_scenarios(&self, filter: Document) -> MongoResult<Vec<ScenarioEntity>> {
        let documents: Vec<MongoScenarioDocument> = self
            .scenarios()
            .find(filter)
            .sort(doc! {"created_at": 1})
            .await
            .map_err(|source| MongoDaoError::QueryScenarios { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::QueryScenarios { source })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn count_scenarios(&self, state: ModerationState) -> MongoResult<u64> {
        self.scenarios()
            .count_documents(doc! {"state": state.as_str()})
            .await
            .map_err(|source| MongoDaoError::QueryScenarios { source })
    }

    async fn append_message(&self, message: RoomMessageEntity) -> MongoResult<()> {
        let room_code = message.room_code.clone();
        let document: MongoRoomMessageDocument = message.into();
        self.messages()
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveMessage { room_code, source })?;
        Ok(())
    }

    async fn find_messages(
        &self,
        room_code: String,
        filter: Document,
        sort: Document,
        limit: Option<i64>,
    ) -> MongoResult<Vec<RoomMessageEntity>> {
        let documents: Vec<MongoRoomMessageDocument> = self
            .messages()
            .find(filter)
            .sort(sort)
            .limit(limit.unwrap_or(0))
            .await
            .map_err(|source| MongoDaoError::QueryMessages {
                room_code: room_code.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::QueryMessages { room_code, source })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn user_name(&self, user_id: String) -> MongoResult<Option<String>> {
        let document = self
            .users()
            .find_one(doc_id(&user_id))
            .await
            .map_err(|source| MongoDaoError::LoadUser { user_id, source })?;
        Ok(document.map(|user| user.user_name))
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

impl RoomStore for MongoStore {
    fn load(&self, code: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.load_room(code).await.map_err(Into::into) })
    }

    fn save(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.save_room(room).await.map_err(Into::into) })
    }

    fn exists(&self, code: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.room_exists(code).await.map_err(Into::into) })
    }

    fn find_by_member(&self, user_id: String) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_rooms(doc! {"members": user_id}, doc! {"created_at": -1})
                .await
                .map_err(Into::into)
        })
    }

    fn find_by_status(
        &self,
        status: RoomStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_rooms(doc! {"status": status.as_str()}, doc! {"created_at": 1})
                .await
                .map_err(Into::into)
        })
    }

    fn find_pending_reports(&self) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_rooms(
                    doc! {"status": RoomStatus::Completed.as_str(), "report": null},
                    doc! {"created_at": 1},
                )
                .await
                .map_err(Into::into)
        })
    }
}

impl ScenarioStore for MongoStore {
    fn save(&self, scenario: ScenarioEntity) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.save_scenario(scenario).await.map_err(Into::into) })
    }

    fn find(&self, id: String) -> BoxFuture<'static, StorageResult<Option<ScenarioEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_scenario(id).await.map_err(Into::into) })
    }

    fn list_by_state(
        &self,
        state: ModerationState,
    ) -> BoxFuture<'static, StorageResult<Vec<ScenarioEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_scenarios(doc! {"state": state.as_str()})
                .await
                .map_err(Into::into)
        })
    }

    fn list_by_submitter(
        &self,
        submitter_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ScenarioEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_scenarios(doc! {
                    "submitter_id": submitter_id,
                    "state": {"$ne": ModerationState::Withdrawn.as_str()},
                })
                .await
                .map_err(Into::into)
        })
    }

    fn count_by_state(&self, state: ModerationState) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.count_scenarios(state).await.map_err(Into::into) })
    }
}

impl RoomMessageStore for MongoStore {
    fn append(&self, message: RoomMessageEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_message(message).await.map_err(Into::into) })
    }

    fn history(
        &self,
        room_code: String,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomMessageEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let filter = doc! {"room_code": room_code.as_str()};
            store
                .find_messages(room_code, filter, doc! {"created_at": 1}, None)
                .await
                .map_err(Into::into)
        })
    }

    fn recent(
        &self,
        room_code: String,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomMessageEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let filter = doc! {"room_code": room_code.as_str()};
            let mut messages = store
                .find_messages(room_code, filter, doc! {"created_at": -1}, Some(limit as i64))
                .await?;
            messages.reverse();
            Ok(messages)
        })
    }

    fn after(
        &self,
        room_code: String,
        after: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomMessageEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let filter = doc! {
                "room_code": room_code.as_str(),
                "created_at": {"$gt": DateTime::from_system_time(after)},
            };
            store
                .find_messages(room_code, filter, doc! {"created_at": 1}, None)
                .await
                .map_err(Into::into)
        })
    }
}

impl MemberDirectory for MongoStore {
    fn resolve_name(&self, user_id: String) -> BoxFuture<'static, String> {
        let store = self.clone();
        Box::pin(async move {
            match store.user_name(user_id.clone()).await {
                Ok(Some(name)) => name,
                Ok(None) => UNKNOWN_MEMBER_NAME.to_string(),
                Err(err) => {
                    warn!(%user_id, error = %err, "member lookup failed; using placeholder name");
                    UNKNOWN_MEMBER_NAME.to_string()
                }
            }
        })
    }
}
