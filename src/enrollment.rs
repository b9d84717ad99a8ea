use log::info;
use rocket::request::FlashMessage;
use rocket::response::status::Custom;
use rocket::response::{Flash, Redirect};
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::{Template, context};

use crate::CurrentAccount;
use crate::account::AccountId;
use crate::classes::{ClassRecord, load_class_by_code};
use crate::db::DbPool;
use crate::util::{flash_note, is_unique_violation, status_any_error, status_sqlx_error};

/// What happened to an enrollment attempt. Genuine storage failures are
/// kept apart and travel as errors.
#[derive(Debug, PartialEq, Eq)]
enum EnrollOutcome {
    Enrolled,
    AlreadyEnrolled,
    ClassFull,
}

async fn enroll_account(account_id: AccountId, class: &ClassRecord, db: &DbPool) -> anyhow::Result<EnrollOutcome> {
    let mut txn = db.0.begin().await?;
    let member = sqlx::query("SELECT account_id FROM enrollments WHERE account_id=? AND class_id=?")
        .bind(account_id)
        .bind(class.id)
        .fetch_optional(&mut *txn)
        .await?;
    if member.is_some() {
        return Ok(EnrollOutcome::AlreadyEnrolled);
    }
    // conditional decrement: the counter never goes below zero, and two
    // concurrent enrollments cannot lose an update on it
    let decremented = sqlx::query("UPDATE classes SET slots_available = slots_available - 1 WHERE id=? AND slots_available > 0")
        .bind(class.id)
        .execute(&mut *txn)
        .await?;
    if decremented.rows_affected() == 0 {
        return Ok(EnrollOutcome::ClassFull);
    }
    let inserted = sqlx::query("INSERT INTO enrollments (account_id, class_id) VALUES (?, ?)")
        .bind(account_id)
        .bind(class.id)
        .execute(&mut *txn)
        .await;
    match inserted {
        Ok(_) => {}
        // lost the race against a concurrent enrollment for the same pair;
        // dropping the transaction rolls the decrement back
        Err(err) if is_unique_violation(&err) => return Ok(EnrollOutcome::AlreadyEnrolled),
        Err(err) => return Err(err.into()),
    }
    txn.commit().await?;
    Ok(EnrollOutcome::Enrolled)
}

#[derive(Responder)]
enum EnlistResponse {
    Note(Flash<Redirect>),
    Silent(Redirect),
}

async fn enlist_class_impl(account: CurrentAccount, code: Option<&str>, db: &State<DbPool>) -> Result<EnlistResponse, Custom<String>> {
    let class = match code {
        Some(code) => load_class_by_code(code, db).await?,
        None => None,
    };
    let Some(class) = class else {
        // unknown or missing class code: no state change
        return Ok(EnlistResponse::Silent(Redirect::to("/homepage")));
    };
    let outcome = enroll_account(account.0.account_id, &class, db)
        .await
        .map_err(status_any_error)?;
    let note = match outcome {
        EnrollOutcome::Enrolled => {
            info!("Account {} enlisted in class {}", account.0.email, class.class_code);
            Flash::success(Redirect::to("/homepage"), "Successfully Enlisted!")
        }
        EnrollOutcome::AlreadyEnrolled => {
            Flash::error(Redirect::to("/homepage"), "Already Enlisted in this class!")
        }
        EnrollOutcome::ClassFull => {
            Flash::error(Redirect::to("/homepage"), "No slots left in this class!")
        }
    };
    Ok(EnlistResponse::Note(note))
}

#[get("/enlistclass?<code>")]
async fn enlist_class(account: CurrentAccount, code: Option<&str>, db: &State<DbPool>) -> Result<EnlistResponse, Custom<String>> {
    enlist_class_impl(account, code, db).await
}

#[post("/enlistclass?<code>")]
async fn post_enlist_class(account: CurrentAccount, code: Option<&str>, db: &State<DbPool>) -> Result<EnlistResponse, Custom<String>> {
    enlist_class_impl(account, code, db).await
}

async fn enrolled_classes_impl(account: CurrentAccount, flash: Option<FlashMessage<'_>>, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let classes: Vec<ClassRecord> = sqlx::query_as(
            "SELECT c.* FROM classes c JOIN enrollments e ON e.class_id = c.id WHERE e.account_id = ?")
        .bind(account.0.account_id)
        .fetch_all(&db.0)
        .await
        .map_err(status_sqlx_error)?;
    let payment_total: i64 = classes.iter().map(|c| c.price).sum();
    Ok(Template::render("userenrolled", context! {
        user: &account.0,
        classes,
        payment_total,
        flash: flash_note(flash),
    }))
}

#[get("/enrolledclasses")]
async fn enrolled_classes(account: CurrentAccount, flash: Option<FlashMessage<'_>>, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    enrolled_classes_impl(account, flash, db).await
}

#[post("/enrolledclasses")]
async fn post_enrolled_classes(account: CurrentAccount, flash: Option<FlashMessage<'_>>, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    enrolled_classes_impl(account, flash, db).await
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            enlist_class,
            post_enlist_class,
            enrolled_classes,
            post_enrolled_classes,
        ])
}
