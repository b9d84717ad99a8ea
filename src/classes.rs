use log::info;
use rocket::form::{self, Contextual, Form};
use rocket::request::FlashMessage;
use rocket::response::status::Custom;
use rocket::response::{Flash, Redirect};
use rocket::{Build, Rocket, State};
use rocket_dyn_templates::{Template, context};
use serde::Serialize;
use sqlx::FromRow;

use crate::db::DbPool;
use crate::util::{FormResponse, flash_note, is_unique_violation, status_sqlx_error};
use crate::{AccountSession, AdminAccount, CurrentAccount};

pub type ClassId = i64;

#[derive(Serialize, FromRow, Clone, Debug)]
pub struct ClassRecord {
    pub id: ClassId,
    pub class_code: String,
    pub category: String,
    pub name: String,
    pub instructor: String,
    pub class_time: String,
    pub price: i64,
    pub slots_available: i64,
}

pub async fn load_class_by_code(code: &str, db: &State<DbPool>) -> Result<Option<ClassRecord>, Custom<String>> {
    sqlx::query_as("SELECT * FROM classes WHERE class_code=?")
        .bind(code)
        .fetch_optional(&db.0)
        .await
        .map_err(status_sqlx_error)
}

async fn render_category(category: &str, account: CurrentAccount, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    let classes: Vec<ClassRecord> = sqlx::query_as("SELECT * FROM classes WHERE category=?")
        .bind(category)
        .fetch_all(&db.0)
        .await
        .map_err(status_sqlx_error)?;
    Ok(Template::render("classes", context! {
        user: &account.0,
        category,
        classes,
    }))
}

#[get("/rowingclasses")]
async fn rowing_classes(account: CurrentAccount, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    render_category("Rowing", account, db).await
}

#[get("/cyclingclasses")]
async fn cycling_classes(account: CurrentAccount, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    render_category("Cycling", account, db).await
}

#[get("/strengthclasses")]
async fn strength_classes(account: CurrentAccount, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    render_category("Strength", account, db).await
}

#[get("/enduranceclasses")]
async fn endurance_classes(account: CurrentAccount, db: &State<DbPool>) -> Result<Template, Custom<String>> {
    render_category("Endurance", account, db).await
}

#[derive(Debug, FromForm)]
struct AddClassForm<'v> {
    #[field(validate = len(1..=10))]
    class_code: &'v str,
    #[field(validate = len(5..=50))]
    category: &'v str,
    #[field(validate = len(5..=50))]
    name: &'v str,
    #[field(validate = len(5..=50))]
    instructor: &'v str,
    #[field(validate = len(5..=50))]
    class_time: &'v str,
    #[field(validate = range(0..))]
    price: i64,
    // a class may be created already full, but never with more than 20 seats
    #[field(validate = range(..=20))]
    slots_available: i64,
}

fn render_add_class(user: &AccountSession, flash: Option<FlashMessage<'_>>, ctx: &form::Context<'_>) -> Template {
    let errors = ctx.errors().map(|e| e.to_string()).collect::<Vec<_>>();
    Template::render("addclass", context! {
        user,
        flash: flash_note(flash),
        errors,
    })
}

#[get("/adminclasses")]
fn admin_classes_page(admin: AdminAccount, flash: Option<FlashMessage<'_>>) -> Template {
    render_add_class(&admin.0, flash, &form::Context::default())
}

#[post("/adminclasses", data = "<form>")]
async fn post_admin_classes<'r>(admin: AdminAccount, form: Form<Contextual<'r, AddClassForm<'r>>>, db: &State<DbPool>) -> Result<FormResponse, Custom<String>> {
    let Some(vals) = form.value.as_ref() else {
        return Ok(FormResponse::Page(render_add_class(&admin.0, None, &form.context)));
    };
    if load_class_by_code(vals.class_code, db).await?.is_some() {
        return Ok(duplicate_class_code());
    }
    let res = sqlx::query("INSERT INTO classes (class_code, category, name, instructor, class_time, price, slots_available) VALUES (?, ?, ?, ?, ?, ?, ?)")
        .bind(vals.class_code)
        .bind(vals.category)
        .bind(vals.name)
        .bind(vals.instructor)
        .bind(vals.class_time)
        .bind(vals.price)
        .bind(vals.slots_available)
        .execute(&db.0)
        .await;
    match res {
        Ok(_) => {
            info!("Class added: {} ({})", vals.class_code, vals.category);
            Ok(FormResponse::Redirect(Flash::success(Redirect::to("/adminclasses"), "Class Successfully Added")))
        }
        Err(err) if is_unique_violation(&err) => Ok(duplicate_class_code()),
        Err(err) => Err(status_sqlx_error(err)),
    }
}

fn duplicate_class_code() -> FormResponse {
    FormResponse::Redirect(Flash::error(Redirect::to("/adminclasses"), "Class code already exists!"))
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            rowing_classes,
            cycling_classes,
            strength_classes,
            endurance_classes,
            admin_classes_page,
            post_admin_classes,
        ])
}
