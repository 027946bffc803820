use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::err::Error;

macro_rules! text_enum {
    ($name:ident, $what:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::invalid(format!("Unknown {} `{}`", $what, other))),
                }
            }
        }
    };
}

text_enum!(Program, "program", {
    Bscs => "BSCS",
    Bsit => "BSIT",
    Bsse => "BSSE",
    Bba => "BBA",
});

text_enum!(Gender, "gender", {
    Male => "Male",
    Female => "Female",
});

text_enum!(SessionStatus, "session status", {
    Pending => "Pending",
    Active => "Active",
    Completed => "Completed",
});

impl Default for Program {
    fn default() -> Self {
        Program::Bscs
    }
}

impl Default for Gender {
    fn default() -> Self {
        Gender::Male
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub full_name: String,
    pub guardian: String,
    pub roll_no: String,
    pub program: Program,
    pub batch: String,
    pub gender: Gender,
    pub national_id: String,
    pub contact: String,
    pub date_of_birth: Option<NaiveDate>,
    pub email: String,
    pub address: String,
    pub form_submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields an operator fills in on the registration and management forms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StudentForm {
    pub full_name: String,
    pub guardian: String,
    pub program: Program,
    pub batch: String,
    pub gender: Gender,
    pub national_id: String,
    pub contact: String,
    pub date_of_birth: Option<NaiveDate>,
    pub email: String,
    pub address: String,
}

impl StudentForm {
    pub fn validate(&self) -> Result<(), Error> {
        if self.full_name.trim().is_empty() {
            return Err(Error::invalid("`full_name` parameter was empty"));
        }
        Ok(())
    }

    pub fn into_student(self, roll_no: String) -> Student {
        Student {
            id: Uuid::new_v4(),
            full_name: self.full_name,
            guardian: self.guardian,
            roll_no,
            program: self.program,
            batch: self.batch,
            gender: self.gender,
            national_id: self.national_id,
            contact: self.contact,
            date_of_birth: self.date_of_birth,
            email: self.email,
            address: self.address,
            form_submitted_at: None,
            created_at: Utc::now(),
        }
    }

    /// Overwrites the editable fields of `student`, leaving identity, roll
    /// number and timestamps alone.
    pub fn apply_to(self, student: &mut Student) {
        student.full_name = self.full_name;
        student.guardian = self.guardian;
        student.program = self.program;
        student.batch = self.batch;
        student.gender = self.gender;
        student.national_id = self.national_id;
        student.contact = self.contact;
        student.date_of_birth = self.date_of_birth;
        student.email = self.email;
        student.address = self.address;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamSession {
    pub id: Uuid,
    pub name: String,
    pub end_date: NaiveDate,
    pub targeted_programs: Vec<Program>,
    pub status: SessionStatus,
    pub exam_details: Option<String>,
    pub assignments: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExamSessionForm {
    pub name: String,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub targeted_programs: Vec<Program>,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub exam_details: Option<String>,
    #[serde(default)]
    pub assignments: Option<String>,
}

impl ExamSessionForm {
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid("`name` parameter was empty"));
        }
        Ok(())
    }

    pub fn into_session(self) -> ExamSession {
        let mut session = ExamSession {
            id: Uuid::new_v4(),
            name: String::new(),
            end_date: self.end_date,
            targeted_programs: Vec::new(),
            status: self.status,
            exam_details: None,
            assignments: None,
            created_at: Utc::now(),
        };
        self.apply_to(&mut session);
        session
    }

    pub fn apply_to(self, session: &mut ExamSession) {
        let mut programs = self.targeted_programs;
        programs.sort();
        programs.dedup();

        session.name = self.name;
        session.end_date = self.end_date;
        session.targeted_programs = programs;
        session.status = self.status;
        session.exam_details = self.exam_details.filter(|s| !s.trim().is_empty());
        session.assignments = self.assignments.filter(|s| !s.trim().is_empty());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn new(student_id: Uuid, date: NaiveDate, status: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            date,
            status,
            created_at: Utc::now(),
        }
    }
}

/// An attendance row joined with the student it belongs to. Student columns
/// are empty when the student no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub status: String,
    pub roll_no: String,
    pub full_name: String,
    pub program: String,
    pub batch: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AdminAccount {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSession {
    pub ssid: String,
    pub belongs_to: Uuid,
    pub expires_at: DateTime<Utc>,
}
